use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Closed set of supported languages.
///
/// Adding a language is a one-place edit: a variant, a `FromStr` arm,
/// and a `LanguageSpec` entry. An unmatched case is an exhaustiveness
/// error at compile time, not a runtime default branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Language {
    Python,
    Javascript,
    Bash,
    Cpp,
    Java,
}

/// How one language runs: the sandbox image to boot, the name of the
/// single source file materialized into the workspace, and the argv that
/// builds/runs it from the `/app` mount point.
#[derive(Debug)]
pub struct LanguageSpec {
    pub image: &'static str,
    pub file_name: &'static str,
    pub command: &'static [&'static str],
}

const PYTHON: LanguageSpec = LanguageSpec {
    image: "python:3.12-alpine",
    file_name: "main.py",
    command: &["python3", "-u", "/app/main.py"],
};

const JAVASCRIPT: LanguageSpec = LanguageSpec {
    image: "node:20-alpine",
    file_name: "app.js",
    command: &["node", "/app/app.js"],
};

const BASH: LanguageSpec = LanguageSpec {
    image: "alpine:3.19",
    file_name: "main.sh",
    command: &["sh", "/app/main.sh"],
};

const CPP: LanguageSpec = LanguageSpec {
    image: "gcc:13",
    file_name: "main.cpp",
    command: &["sh", "-c", "g++ /app/main.cpp -o /app/main && /app/main"],
};

const JAVA: LanguageSpec = LanguageSpec {
    image: "eclipse-temurin:21",
    file_name: "Main.java",
    command: &["sh", "-c", "javac -d /app /app/Main.java && java -cp /app Main"],
};

impl Language {
    pub const fn spec(self) -> &'static LanguageSpec {
        match self {
            Language::Python => &PYTHON,
            Language::Javascript => &JAVASCRIPT,
            Language::Bash => &BASH,
            Language::Cpp => &CPP,
            Language::Java => &JAVA,
        }
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "python" => Ok(Language::Python),
            "javascript" => Ok(Language::Javascript),
            "bash" => Ok(Language::Bash),
            "cpp" => Ok(Language::Cpp),
            "java" => Ok(Language::Java),
            other => Err(Error::UnsupportedLanguage(other.to_string())),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Language::Python => "python",
            Language::Javascript => "javascript",
            Language::Bash => "bash",
            Language::Cpp => "cpp",
            Language::Java => "java",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supported_languages() {
        assert_eq!("python".parse::<Language>().unwrap(), Language::Python);
        assert_eq!("cpp".parse::<Language>().unwrap(), Language::Cpp);
    }

    #[test]
    fn rejects_unknown_language() {
        let err = "ruby".parse::<Language>().unwrap_err();
        assert!(err.to_string().contains("ruby"));
    }

    #[test]
    fn spec_names_one_source_file() {
        assert_eq!(Language::Python.spec().file_name, "main.py");
        assert_eq!(Language::Java.spec().file_name, "Main.java");
        assert!(Language::Javascript.spec().command.contains(&"node"));
    }
}
