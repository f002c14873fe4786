//! drives one compilation: descriptor in, class unit out.
//!
//! The translator owns its collaborators for the length of a run. Methods are compiled in
//! declaration order. A method whose query cannot be planned or lowered is dropped and reported,
//! and the rest of the class still compiles; a descriptor that fails validation stops the run before
//! anything is compiled.

use tracing::{error, info, info_span, warn};

use crate::codegen::{Assembler, ClassUnit, MethodUnit};
use crate::descriptor::{ClassDescriptor, MethodDescriptor};
use crate::lowering::{self, LoweringRules};
use crate::oracle::{PlanOracle, PlanOutcome};
use crate::registry::{TypeRegistry, UserDto};
use crate::render::{self, Renderer};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompilerOptions {
    /// fail, rather than warn, when no method of a class compiles.
    pub deny_empty_class: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    PlanUnavailable,
    UnsupportedOperator,
    MalformedPlan,
    Schema,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::PlanUnavailable => "no plan available",
            FailureKind::UnsupportedOperator => "unsupported operator",
            FailureKind::MalformedPlan => "malformed plan",
            FailureKind::Schema => "schema error",
        };
        s.fmt(f)
    }
}

/// why a method was left out of the class unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodFailure {
    pub method: String,
    pub query: String,
    pub kind: FailureKind,
    pub reason: String,
}

impl std::fmt::Display for MethodFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Method {} dropped ({}): {} [query: {}]",
            self.method, self.kind, self.reason, self.query
        )
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid descriptor: {0}")]
    ConfigValidation(#[from] crate::descriptor::Error),
    #[error("No method of class {0} compiled.")]
    EmptyClass(String),
    #[error("Rendering failed: {0}")]
    Render(#[from] render::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub class_unit: ClassUnit,
    pub failures: Vec<MethodFailure>,
}

pub struct Translator<O: PlanOracle> {
    oracle: O,
    rules: LoweringRules,
    registry: TypeRegistry,
    assembler: Assembler,
    options: CompilerOptions,
}

impl<O: PlanOracle> Translator<O> {
    pub fn new(oracle: O, registry: TypeRegistry) -> Self {
        Translator {
            oracle,
            rules: LoweringRules::standard(),
            registry,
            assembler: Assembler::new(),
            options: CompilerOptions::default(),
        }
    }

    pub fn with_rules(mut self, rules: LoweringRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_options(mut self, options: CompilerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    fn compile_method(&mut self, m: &MethodDescriptor) -> Result<MethodUnit, MethodFailure> {
        let fail = |kind: FailureKind, reason: String| MethodFailure {
            method: m.method_name.clone(),
            query: m.query.clone(),
            kind,
            reason,
        };
        let dtos = m
            .input_params
            .iter()
            .map(|p| UserDto::new(p, &self.registry))
            .collect::<Result<Vec<UserDto>, _>>()
            .map_err(|e| fail(FailureKind::Schema, e.to_string()))?;
        let schema = self
            .oracle
            .create_schema(&dtos)
            .map_err(|e| fail(FailureKind::Schema, e.to_string()))?;
        let plan = match self.oracle.get_plan(&m.query, &schema) {
            PlanOutcome::Plan(p) => p,
            PlanOutcome::Unavailable(reason) => return Err(fail(FailureKind::PlanUnavailable, reason)),
        };
        let stmts =
            crate::walker::lower_plan(&plan, &self.rules, &m.output_param).map_err(|e| {
                let kind = match e {
                    lowering::Error::UnsupportedOperator(_) => FailureKind::UnsupportedOperator,
                    lowering::Error::MalformedPlan(_) => FailureKind::MalformedPlan,
                };
                fail(kind, e.to_string())
            })?;
        Ok(self.assembler.create_method(m, &dtos, stmts))
    }

    /// Compiles every method of `class`. Per-method failures are collected, not returned.
    pub fn translate(&mut self, class: &ClassDescriptor) -> Result<Translation, Error> {
        class.validate(&self.registry)?;
        let mut units = vec![];
        let mut failures = vec![];
        for m in &class.methods {
            let span = info_span!("method", name = %m.method_name);
            let _guard = span.enter();
            match self.compile_method(m) {
                Ok(unit) => {
                    info!("Compiled into {} statements", unit.statements.len());
                    units.push(unit);
                }
                Err(f) => {
                    error!("{}", f);
                    failures.push(f);
                }
            }
        }
        let class_unit = self.assembler.create_class(class, units);
        if class_unit.methods.is_empty() {
            if self.options.deny_empty_class {
                return Err(Error::EmptyClass(class.absolute_name.clone()));
            }
            warn!("No method of {} compiled; emitting an empty class", class.absolute_name);
        }
        info!(
            "Translated {}: {} methods compiled, {} dropped",
            class.absolute_name,
            class_unit.methods.len(),
            failures.len()
        );
        Ok(Translation {
            class_unit,
            failures,
        })
    }

    /// Translates `class`, renders it, and hands the file name and text to `sink`.
    /// Nothing reaches the sink unless translation and rendering both succeed.
    pub fn translate_and_render<R, F>(
        &mut self,
        class: &ClassDescriptor,
        renderer: &R,
        sink: F,
    ) -> Result<Translation, Error>
    where
        R: Renderer + ?Sized,
        F: FnOnce(&str, &str) -> Result<(), render::Error>,
    {
        let translation = self.translate(class)?;
        let text = renderer.render(&translation.class_unit)?;
        sink(&renderer.file_name(&translation.class_unit), &text)?;
        Ok(translation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::method_descriptor;
    use crate::ir::OperatorKind;
    use crate::marshal::fixtures::Person;
    use crate::oracle::SqlOracle;
    use crate::render::RustRenderer;
    use crate::schema::Schema;

    fn registry() -> TypeRegistry {
        crate::logging::init_for_tests();
        let mut r = TypeRegistry::new();
        r.register::<Person>();
        r
    }

    fn class(methods: Vec<MethodDescriptor>) -> ClassDescriptor {
        ClassDescriptor {
            absolute_name: "dao.PersonDao".to_string(),
            methods,
        }
    }

    /// Counts plan requests and answers none of them.
    #[derive(Default)]
    struct RefusingOracle {
        calls: usize,
    }

    impl PlanOracle for RefusingOracle {
        fn get_plan(&mut self, _query: &str, _schema: &Schema) -> PlanOutcome {
            self.calls += 1;
            PlanOutcome::Unavailable("closed".to_string())
        }
    }

    #[test]
    fn test_get_names_scenario() {
        let mut t = Translator::new(SqlOracle::new(), registry());
        let c = class(vec![method_descriptor(
            "getNames",
            &["model.Person"],
            "model.Person",
            "SELECT name FROM Person",
        )]);
        let tr = t.translate(&c).unwrap();
        assert!(tr.failures.is_empty());
        let m = tr.class_unit.method("getNames").unwrap();
        let text: Vec<String> = m.statements.iter().map(|s| s.to_string()).collect();
        assert_eq!(
            text,
            vec![
                "r1 = project[name](person_rows)",
                "output = from_sequence[model.Person](r1)",
            ]
        );
    }

    #[test]
    fn test_unavailable_plan_drops_only_that_method() {
        let mut t = Translator::new(SqlOracle::new(), registry());
        let c = class(vec![
            method_descriptor("getNames", &["model.Person"], "model.Person", "SELECT name FROM Person"),
            method_descriptor("broken", &["model.Person"], "model.Person", "SELECT shoe FROM Person"),
            method_descriptor("getAll", &["model.Person"], "model.Person", "SELECT * FROM Person"),
        ]);
        let tr = t.translate(&c).unwrap();
        let names: Vec<&str> = tr.class_unit.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["getNames", "getAll"]);
        assert_eq!(tr.failures.len(), 1);
        assert_eq!(tr.failures[0].method, "broken");
        assert_eq!(tr.failures[0].kind, FailureKind::PlanUnavailable);
        assert_eq!(tr.failures[0].query, "SELECT shoe FROM Person");
    }

    #[test]
    fn test_oracle_is_asked_once_per_method() {
        let mut t = Translator::new(RefusingOracle::default(), registry());
        let c = class(vec![
            method_descriptor("a", &["model.Person"], "model.Person", "q1"),
            method_descriptor("b", &["model.Person"], "model.Person", "q2"),
        ]);
        let tr = t.translate(&c).unwrap();
        assert_eq!(t.oracle().calls, 2);
        assert_eq!(tr.failures.len(), 2);
        // An empty class is still produced, helpers included.
        assert!(tr.class_unit.methods.is_empty());
        assert_eq!(tr.class_unit.helpers.len(), 2);
    }

    #[test]
    fn test_deny_empty_class() {
        let mut t = Translator::new(RefusingOracle::default(), registry()).with_options(
            CompilerOptions {
                deny_empty_class: true,
            },
        );
        let c = class(vec![method_descriptor("a", &["model.Person"], "model.Person", "q")]);
        assert!(matches!(t.translate(&c), Err(Error::EmptyClass(_))));
    }

    #[test]
    fn test_unsupported_operator_drops_method() {
        let mut rules = LoweringRules::standard();
        rules.unregister(OperatorKind::Selection);
        let mut t = Translator::new(SqlOracle::new(), registry()).with_rules(rules);
        let c = class(vec![
            method_descriptor("adults", &["model.Person"], "model.Person", "SELECT name FROM Person WHERE age > 17"),
            method_descriptor("names", &["model.Person"], "model.Person", "SELECT name FROM Person"),
        ]);
        let tr = t.translate(&c).unwrap();
        assert_eq!(tr.class_unit.methods.len(), 1);
        assert_eq!(tr.failures[0].kind, FailureKind::UnsupportedOperator);
    }

    #[test]
    fn test_unregistered_type_is_a_config_error() {
        let mut t = Translator::new(SqlOracle::new(), registry());
        let c = class(vec![method_descriptor("pets", &["model.Pet"], "model.Pet", "SELECT * FROM Pet")]);
        assert!(matches!(
            t.translate(&c),
            Err(Error::ConfigValidation(crate::descriptor::Error::UnknownType { .. }))
        ));
    }

    #[test]
    fn test_translation_is_deterministic() {
        let c = class(vec![
            method_descriptor(
                "adultNames",
                &["model.Person"],
                "model.Person",
                "SELECT name FROM Person WHERE age >= 18 AND height > 1.5",
            ),
            method_descriptor(
                "countByAge",
                &["model.Person"],
                "model.Person",
                "SELECT age, count(*) AS n FROM Person GROUP BY age",
            ),
        ]);
        let render = || {
            let mut out = String::new();
            let mut t = Translator::new(SqlOracle::new(), registry());
            t.translate_and_render(&c, &RustRenderer::new(), |_, text| {
                out = String::from(text);
                Ok(())
            })
            .unwrap();
            out
        };
        let first = render();
        assert!(!first.is_empty());
        assert_eq!(first, render());
    }

    #[test]
    fn test_render_failure_reaches_no_sink() {
        let mut t = Translator::new(SqlOracle::new(), registry());
        let c = class(vec![method_descriptor(
            "1names",
            &["model.Person"],
            "model.Person",
            "SELECT name FROM Person",
        )]);
        let mut called = false;
        let r = t.translate_and_render(&c, &RustRenderer::new(), |_, _| {
            called = true;
            Ok(())
        });
        assert!(matches!(r, Err(Error::Render(_))));
        assert!(!called);
    }
}
