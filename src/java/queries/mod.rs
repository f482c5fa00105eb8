//! Tree-sitter query strings used by the Java assembler.

/// Tree-sitter query that returns the package of a file
/// * `name`: name of the package
/// * `declaration`: the whole package declaration
pub const PACKAGE_QUERY: &str = include_str!("package.scm");

/// Tree-sitter query that finds methods called `name`
/// * `name`: the method identifier
/// * `method`: the whole method declaration
pub fn method_named_query(name: &str) -> String {
    format!(include_str!("main_method.scm"), name)
}
