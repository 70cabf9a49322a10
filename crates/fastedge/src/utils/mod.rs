pub(crate) mod logger;
pub(crate) mod prompts;
pub(crate) mod spinner;
pub(crate) mod styles;

pub(crate) static CHECK: &str = "✔";
pub(crate) static MARK: &str = "✘";
