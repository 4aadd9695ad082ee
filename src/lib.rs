mod collect;
mod config;
mod parser;

pub use collect::{
    CollectError, CollectReport, CollectResult, Collector, CommandLineSource, LnkParseTool,
    decode_text, extract_command_line, read_text,
};
pub use config::{Config, ConfigError, UndefinedPolicy};
pub use parser::{
    Assignment, BatchSession, DeobfError, DeobfuscationResult, Dialect, InfSession,
    ResolutionResult, Resolver, Substitution, SubstitutionExpr, SymbolTable, Template,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_input_is_unchanged() {
        let input = r#"cmd /c start "" ie4uinit.exe -BaseSettings"#;
        let result = BatchSession::new().deobfuscate(input);
        assert_eq!(result.output(), input);
        assert!(result.assignments().is_empty());
        assert!(result.errors().is_empty());

        let inf = "[Version]\nSignature=\"$Windows NT$\"";
        assert_eq!(InfSession::new().safe_eval(inf), inf);
    }

    #[test]
    fn chained_definitions() {
        let result = BatchSession::new().deobfuscate("set A=foo & set B=%A%bar & echo %B%");
        assert_eq!(result.output(), "echo foobar");

        let mut table = SymbolTable::new();
        for assignment in result.assignments() {
            table.define(assignment);
        }
        let resolved = Resolver::new(&table, Dialect::Batch).resolve(&SubstitutionExpr::DirectRef {
            name: "B".to_string(),
        });
        assert_eq!(resolved.value, "foobar");
        assert!(!resolved.cyclic);
    }

    #[test]
    fn slicing() {
        let session = BatchSession::new();
        assert_eq!(session.safe_eval("set A=HelloWorld & echo %A:~0,5%"), "echo Hello");
        assert_eq!(session.safe_eval("set A=HelloWorld & echo %A:~-5%"), "echo World");
        assert_eq!(session.safe_eval("set A=HelloWorld & echo %A:~2%"), "echo lloWorld");
        assert_eq!(session.safe_eval("set A=HelloWorld & echo %A:~1,-5%"), "echo ello");
        assert_eq!(session.safe_eval("set A=HelloWorld & echo %A:~x,2%"), "echo HelloWorld");
    }

    #[test]
    fn default_value() {
        let session = BatchSession::new();
        assert_eq!(session.safe_eval("echo [%C%]"), "echo []");
        assert_eq!(session.safe_eval("echo %C:-fallback%"), "echo fallback");
        assert_eq!(session.safe_eval("set C=value & echo %C:-fallback%"), "echo value");
    }

    #[test]
    fn cycle_terminates() {
        let result = BatchSession::new().deobfuscate("set A=%B% & set B=%A%");
        assert_eq!(result.output(), "");

        let mut table = SymbolTable::new();
        table.set("A", "%B%");
        table.set("B", "%A%");
        let mut resolver = Resolver::new(&table, Dialect::Batch);
        let resolved = resolver.resolve(&SubstitutionExpr::DirectRef {
            name: "A".to_string(),
        });
        assert_eq!(resolved.value, "");
        assert!(resolved.cyclic);
        assert_eq!(
            resolver.take_errors(),
            vec![DeobfError::CyclicReference("A".to_string())]
        );
    }

    #[test]
    fn last_write_wins() {
        assert_eq!(
            BatchSession::new().safe_eval("set A=1 & set A=2 & echo %A%"),
            "echo 2"
        );
    }

    #[test]
    fn shortcut_payload() {
        let _ = env_logger::builder().is_test(true).try_init();
        let input = r#"/c (for %g in ("wJ=ie4" "qA=uinit") do @set %~g) && (for %f in ("s") do @set "Ov=%~f") && set "Tz=nx-BaseSettin" && call %wJ%%qA%.exe %Tz:~2%g%Ov%"#;
        let result = BatchSession::new().deobfuscate(input);
        assert_eq!(result.output(), "call ie4uinit.exe -BaseSettings");
        assert_eq!(
            result.assignments(),
            &[
                Assignment::new("wJ", "ie4", 0),
                Assignment::new("qA", "uinit", 1),
                Assignment::new("Ov", "s", 2),
                Assignment::new("Tz", "nx-BaseSettin", 3),
            ]
        );
        assert!(!result.is_cyclic());
        assert!(result.errors().is_empty());
    }

    #[test]
    fn pretty_output() {
        let steps = (0..8)
            .map(|i| format!("echo step-number-{i:02}"))
            .collect::<Vec<String>>();
        let input = format!("set S=step&& {}", steps.join("&&"));

        let pretty = BatchSession::new().safe_eval(&input);
        assert_eq!(pretty, steps.join(" &&\n  "));

        let raw = BatchSession::new()
            .with_config(Config::default().with_raw(true))
            .safe_eval(&input);
        assert_eq!(raw, steps.join(" && "));
    }
}
