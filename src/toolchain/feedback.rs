/// Turns common compiler and linker failures into a one-line hint.
pub struct FeedbackAnalyzer;

impl FeedbackAnalyzer {
    pub fn analyze(output: &str) -> Option<String> {
        // Missing entry point (specific linker error)
        if output.contains("undefined reference to `main'")
            || output.contains("entry point must be defined")
        {
            return Some(
                "The project has no main() function. Add one, or change the project kind to a library."
                    .to_string(),
            );
        }

        // Unresolved symbol (generic linker error)
        if output.contains("LNK2019") || output.contains("undefined reference to") {
            return Some(
                "Linker error: a library may be missing from the project's Libraries list."
                    .to_string(),
            );
        }

        // Missing header (compiler error)
        if output.contains("fatal error: ") && output.contains("No such file or directory")
            || output.contains("cannot open include file")
        {
            return Some(
                "Missing header: check the project's IncludeDirs or the library it belongs to."
                    .to_string(),
            );
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linker_error() {
        let err = "error LNK2019: unresolved external symbol foo";
        let msg = FeedbackAnalyzer::analyze(err).unwrap();
        assert!(msg.contains("Linker error"));
        assert!(msg.contains("Libraries"));
    }

    #[test]
    fn test_include_error() {
        let err = "fatal error: foo.h: No such file or directory";
        let msg = FeedbackAnalyzer::analyze(err).unwrap();
        assert!(msg.contains("Missing header"));
    }

    #[test]
    fn test_main_error() {
        let err = "undefined reference to `main'";
        let msg = FeedbackAnalyzer::analyze(err).unwrap();
        assert!(msg.contains("no main() function"));
    }

    #[test]
    fn test_unknown_output() {
        assert_eq!(FeedbackAnalyzer::analyze("warning: unused variable"), None);
    }
}
