//! renders a class unit as source text, and writes it out.
//!
//! [`RustRenderer`] emits a Rust module: one struct named after the class, one associated function
//! per method, and the marshalling helpers. Each method body binds its parameters' rows, then one
//! closure per statement. Calling a closure builds a fresh iterator, so every sequence is lazy and
//! can be read again; nothing runs until the final conversion collects the output.
//!
//! The module is built as a token stream. Every name that reaches it is parsed as a Rust
//! identifier first, so keywords and malformed names are reported instead of emitted.

use std::collections::{HashMap, HashSet};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use convert_case::{Case, Casing};
use itertools::Itertools;
use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::Ident;
use tracing::{debug, info};

use crate::codegen::{ClassUnit, HelperUnit, MethodUnit};
use crate::ir::{Aggregate, Binding, Predicate};
use crate::pipeline::{Operation, Statement};
use crate::registry::{package_name, simple_name};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{0} is not a valid identifier.")]
    InvalidIdentifier(String),
    #[error("Methods {first} and {second} would both be named {name}.")]
    DuplicateMethod {
        name: String,
        first: String,
        second: String,
    },
    #[error("Method {method} reads {binding} before it is bound.")]
    UnboundBinding { method: String, binding: Binding },
    #[error("Method {method}: {binding} expects {expected} inputs but has {actual}.")]
    WrongInputCount {
        method: String,
        binding: Binding,
        expected: usize,
        actual: usize,
    },
    #[error("Method {0} has no output statement.")]
    MissingOutput(String),
    #[error("Generated code for {class} does not parse: {source}")]
    Syntax { class: String, source: syn::Error },
}

pub trait Renderer {
    fn render(&self, class: &ClassUnit) -> Result<String, Error>;

    /// the file name the rendered class is written to.
    fn file_name(&self, class: &ClassUnit) -> String;
}

/// Writes `text` to `path` atomically: it goes to a temporary file in the same directory, which
/// then replaces `path`. A failed write leaves `path` untouched.
pub fn persist(path: &Path, text: &str) -> Result<(), Error> {
    let io_err = |source| Error::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(io_err)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
    tmp.write_all(text.as_bytes()).map_err(io_err)?;
    tmp.flush().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    info!("Wrote {} bytes to {}", text.len(), path.display());
    Ok(())
}

/// `s` as an identifier. Keywords are rejected.
fn ident(s: &str) -> Result<Ident, Error> {
    syn::parse_str::<Ident>(s).map_err(|_| Error::InvalidIdentifier(String::from(s)))
}

fn path(s: &str) -> Result<syn::Path, Error> {
    syn::parse_str::<syn::Path>(s).map_err(|_| Error::InvalidIdentifier(String::from(s)))
}

/// the variant name of a fieldless enum value, e.g. `Gt`.
fn variant<T: std::fmt::Debug>(v: &T) -> Result<Ident, Error> {
    ident(&format!("{:?}", v))
}

/// Emits Rust source that uses this crate's runtime kernels.
pub struct RustRenderer {
    /// the crate path user types are imported from.
    pub type_root: String,
    /// the path this crate is imported under by the generated code.
    pub runtime: String,
}

impl Default for RustRenderer {
    fn default() -> Self {
        RustRenderer {
            type_root: String::from("crate"),
            runtime: String::from("streamgen"),
        }
    }
}

impl RustRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// `use crate::model::Person;` for `model.Person`.
    fn type_use(&self, type_name: &str) -> Result<TokenStream, Error> {
        let root = path(&self.type_root)?;
        let package = package_name(type_name)
            .split('.')
            .filter(|s| !s.is_empty())
            .map(ident)
            .collect::<Result<Vec<Ident>, Error>>()?;
        let ty = ident(simple_name(type_name))?;
        Ok(quote!(use #root #(:: #package)* :: #ty;))
    }

    fn predicate(p: &Predicate) -> Result<TokenStream, Error> {
        Ok(match p {
            Predicate::Compare { column, op, value } => {
                let op = variant(op)?;
                quote!(rt::compare(row, #column, CmpOp::#op, &#value))
            }
            Predicate::And(l, r) => {
                let (l, r) = (Self::predicate(l)?, Self::predicate(r)?);
                quote!((#l && #r))
            }
            Predicate::Or(l, r) => {
                let (l, r) = (Self::predicate(l)?, Self::predicate(r)?);
                quote!((#l || #r))
            }
        })
    }

    fn str_slice(items: &[String]) -> TokenStream {
        if items.is_empty() {
            quote!(&[] as &[&str])
        } else {
            quote!(&[#(#items),*])
        }
    }

    fn aggregate(a: &Aggregate) -> Result<TokenStream, Error> {
        let func = variant(&a.func)?;
        let column = match &a.column {
            Some(c) => quote!(Some(#c.to_string())),
            None => quote!(None),
        };
        let output = &a.output;
        Ok(quote!(Aggregate { func: AggFunc::#func, column: #column, output: #output.to_string() }))
    }

    /// the expression producing a fresh iterator over `binding`.
    fn source(binding: &Binding, params: &HashSet<&Binding>) -> Result<TokenStream, Error> {
        let b = ident(&binding.to_string())?;
        Ok(if params.contains(binding) {
            quote!(#b.iter().cloned().map(Some))
        } else {
            quote!(#b())
        })
    }

    fn statement(
        m: &MethodUnit,
        s: &Statement,
        params: &HashSet<&Binding>,
    ) -> Result<TokenStream, Error> {
        let result = ident(&s.result.to_string())?;
        let inputs = s
            .inputs
            .iter()
            .map(|b| Self::source(b, params))
            .collect::<Result<Vec<TokenStream>, Error>>()?;
        Ok(match (&s.operation, inputs.as_slice()) {
            (Operation::Project { attributes }, [input]) => {
                let attributes = Self::str_slice(attributes);
                quote!(let #result = || #input.map(|r| rt::project_row(r, #attributes));)
            }
            (Operation::Filter { predicate }, [input]) => {
                let predicate = Self::predicate(predicate)?;
                quote!(let #result = || #input.filter(|r| rt::keep_row(r, |row| #predicate));)
            }
            (
                Operation::Join {
                    left_key,
                    right_key,
                },
                [left, right],
            ) => quote!(
                let #result = || rt::join_rows(#left, #right.collect(), #left_key, #right_key);
            ),
            (
                Operation::Aggregate {
                    group_by,
                    aggregates,
                },
                [input],
            ) => {
                let group_by = Self::str_slice(group_by);
                let aggregates = aggregates
                    .iter()
                    .map(Self::aggregate)
                    .collect::<Result<Vec<TokenStream>, Error>>()?;
                quote!(
                    let #result = || rt::aggregate_rows(#input, #group_by, &[#(#aggregates),*]).into_iter();
                )
            }
            (Operation::FromSequence { type_name }, [input]) => {
                let helper = ident(
                    &HelperUnit::FromRows {
                        type_name: type_name.clone(),
                    }
                    .name(),
                )?;
                quote!(#helper(#input))
            }
            (operation, _) => {
                return Err(Error::WrongInputCount {
                    method: m.name.clone(),
                    binding: s.result.clone(),
                    expected: operation.arity(),
                    actual: s.inputs.len(),
                })
            }
        })
    }

    fn method(&self, m: &MethodUnit, name: &Ident) -> Result<TokenStream, Error> {
        let output = m
            .output()
            .ok_or_else(|| Error::MissingOutput(m.name.clone()))?;
        let available: Vec<Binding> = m.parameters.iter().map(|p| p.rows.clone()).collect();
        crate::walker::check_topological(&m.statements, &available).map_err(|binding| {
            Error::UnboundBinding {
                method: m.name.clone(),
                binding,
            }
        })?;
        let mut args = vec![];
        let mut bind_rows = vec![];
        for p in &m.parameters {
            let arg = ident(&p.ident)?;
            let ty = ident(simple_name(&p.type_name))?;
            let rows = ident(&p.rows.to_string())?;
            let helper = ident(
                &HelperUnit::ToRows {
                    type_name: p.type_name.clone(),
                }
                .name(),
            )?;
            args.push(quote!(#arg: &[#ty]));
            bind_rows.push(quote!(let #rows = #helper(#arg);));
        }
        let params: HashSet<&Binding> = available.iter().collect();
        let body = m
            .statements
            .iter()
            .map(|s| Self::statement(m, s, &params))
            .collect::<Result<Vec<TokenStream>, Error>>()?;
        let return_type = ident(simple_name(&m.return_type))?;
        debug!("Rendered {} ending in {}", name, output);
        Ok(quote! {
            pub fn #name(#(#args),*) -> Vec<#return_type> {
                #(#bind_rows)*
                #(#body)*
            }
        })
    }

    /// snake-cased method names, in method order. Two methods may not end up with the same name.
    fn method_names(class: &ClassUnit) -> Result<Vec<Ident>, Error> {
        let mut seen: HashMap<String, &str> = HashMap::new();
        let mut names = vec![];
        for m in &class.methods {
            let name = m.name.to_case(Case::Snake);
            if let Some(first) = seen.insert(name.clone(), m.name.as_str()) {
                return Err(Error::DuplicateMethod {
                    name,
                    first: String::from(first),
                    second: m.name.clone(),
                });
            }
            names.push(ident(&name)?);
        }
        Ok(names)
    }

    fn helper(h: &HelperUnit) -> Result<TokenStream, Error> {
        let t = ident(simple_name(h.type_name()))?;
        let name = ident(&h.name())?;
        Ok(match h {
            HelperUnit::ToRows { .. } => quote! {
                #[allow(dead_code)]
                fn #name(objs: &[#t]) -> Vec<Row> {
                    Marshaler::<#t>::new().to_rows(objs)
                }
            },
            HelperUnit::FromRows { .. } => quote! {
                #[allow(dead_code)]
                fn #name(rows: impl Iterator<Item = Option<Row>>) -> Vec<#t> {
                    Marshaler::<#t>::new().from_sequence(rows)
                }
            },
        })
    }

    fn imports(&self, class: &ClassUnit) -> Result<TokenStream, Error> {
        let ops: Vec<&Operation> = class
            .methods
            .iter()
            .flat_map(|m| m.statements.iter().map(|s| &s.operation))
            .collect();
        let uses_rt = ops
            .iter()
            .any(|o| !matches!(o, Operation::FromSequence { .. }));
        let uses_filter = ops.iter().any(|o| matches!(o, Operation::Filter { .. }));
        let uses_agg = ops.iter().any(|o| matches!(o, Operation::Aggregate { .. }));
        let rt = path(&self.runtime)?;
        let mut tokens = quote!();
        if uses_filter || uses_agg {
            let mut names = vec![];
            if uses_agg {
                names.extend([format_ident!("AggFunc"), format_ident!("Aggregate")]);
            }
            if uses_filter {
                names.push(format_ident!("CmpOp"));
            }
            tokens.extend(quote!(use #rt::ir::{#(#names),*};));
        }
        tokens.extend(quote!(use #rt::marshal::Marshaler;));
        if uses_rt {
            tokens.extend(quote!(use #rt::pipeline_interpreter as rt;));
        }
        tokens.extend(quote!(use #rt::row::Row;));
        if uses_filter {
            tokens.extend(quote!(use #rt::sql_value::SqlValue;));
        }
        for t in class.helpers.iter().map(|h| h.type_name()).unique() {
            tokens.extend(self.type_use(t)?);
        }
        Ok(tokens)
    }
}

impl Renderer for RustRenderer {
    fn render(&self, class: &ClassUnit) -> Result<String, Error> {
        let class_name = ident(&class.name)?;
        let imports = self.imports(class)?;
        let methods = class
            .methods
            .iter()
            .zip(Self::method_names(class)?)
            .map(|(m, name)| self.method(m, &name))
            .collect::<Result<Vec<TokenStream>, Error>>()?;
        let helpers = class
            .helpers
            .iter()
            .map(Self::helper)
            .collect::<Result<Vec<TokenStream>, Error>>()?;
        let tokens = quote! {
            #imports

            pub struct #class_name;

            impl #class_name {
                #(#methods)*
            }

            #(#helpers)*
        };
        syn::parse2::<syn::File>(tokens.clone()).map_err(|source| Error::Syntax {
            class: class.qualified_name(),
            source,
        })?;
        Ok(format!(
            "// Generated by streamgen from {}. Do not edit.\n\n{}\n",
            class.qualified_name(),
            tokens
        ))
    }

    fn file_name(&self, class: &ClassUnit) -> String {
        format!("{}.rs", class.name.to_case(Case::Snake))
    }
}

#[cfg(test)]
fn get_names_unit() -> ClassUnit {
    use crate::codegen::Parameter;
    ClassUnit {
        package: "dao".to_string(),
        name: "PersonDao".to_string(),
        methods: vec![MethodUnit {
            name: "getNames".to_string(),
            parameters: vec![Parameter {
                ident: "person".to_string(),
                type_name: "model.Person".to_string(),
                rows: Binding::rows_of("person"),
            }],
            statements: vec![
                Statement::new(
                    Binding::new("r1"),
                    Operation::Project {
                        attributes: vec!["name".to_string()],
                    },
                    vec![Binding::rows_of("person")],
                ),
                Statement::from_sequence(Binding::new("r1"), "model.Person"),
            ],
            return_type: "model.Person".to_string(),
        }],
        helpers: vec![
            HelperUnit::ToRows {
                type_name: "model.Person".to_string(),
            },
            HelperUnit::FromRows {
                type_name: "model.Person".to_string(),
            },
        ],
    }
}

/// `src` as printed by the token printer, so that layout does not matter in comparisons.
#[cfg(test)]
fn canonical(src: &str) -> String {
    src.parse::<TokenStream>().unwrap().to_string()
}

#[test]
fn test_render_projection() {
    let text = RustRenderer::new().render(&get_names_unit()).unwrap();
    assert!(text.starts_with("// Generated by streamgen from dao.PersonDao. Do not edit.\n"));
    let expected = r#"
use streamgen::marshal::Marshaler;
use streamgen::pipeline_interpreter as rt;
use streamgen::row::Row;

use crate::model::Person;

pub struct PersonDao;

impl PersonDao {
    pub fn get_names(person: &[Person]) -> Vec<Person> {
        let person_rows = person_to_rows(person);
        let r1 = || person_rows.iter().cloned().map(Some).map(|r| rt::project_row(r, &["name"]));
        rows_to_person(r1())
    }
}

#[allow(dead_code)]
fn person_to_rows(objs: &[Person]) -> Vec<Row> {
    Marshaler::<Person>::new().to_rows(objs)
}

#[allow(dead_code)]
fn rows_to_person(rows: impl Iterator<Item = Option<Row>>) -> Vec<Person> {
    Marshaler::<Person>::new().from_sequence(rows)
}
"#;
    assert_eq!(canonical(&text), canonical(expected));
    assert_eq!(RustRenderer::new().file_name(&get_names_unit()), "person_dao.rs");
}

#[test]
fn test_render_filter_and_aggregate() {
    use crate::ir::{AggFunc, CmpOp};
    use crate::sql_value::SqlValue;
    let mut unit = get_names_unit();
    let m = &mut unit.methods[0];
    m.statements = vec![
        Statement::new(
            Binding::new("r1"),
            Operation::Filter {
                predicate: Predicate::Or(
                    Box::new(Predicate::Compare {
                        column: "age".to_string(),
                        op: CmpOp::Gt,
                        value: SqlValue::Int(30),
                    }),
                    Box::new(Predicate::Compare {
                        column: "name".to_string(),
                        op: CmpOp::Eq,
                        value: SqlValue::Text("Ann".to_string()),
                    }),
                ),
            },
            vec![Binding::rows_of("person")],
        ),
        Statement::new(
            Binding::new("r2"),
            Operation::Aggregate {
                group_by: vec![],
                aggregates: vec![Aggregate {
                    func: AggFunc::Count,
                    column: None,
                    output: "n".to_string(),
                }],
            },
            vec![Binding::new("r1")],
        ),
        Statement::from_sequence(Binding::new("r2"), "model.Person"),
    ];
    let text = canonical(&RustRenderer::new().render(&unit).unwrap());
    let fragments = [
        "use streamgen::ir::{AggFunc, Aggregate, CmpOp};",
        "use streamgen::sql_value::SqlValue;",
        r#"let r1 = || person_rows.iter().cloned().map(Some).filter(|r| rt::keep_row(r, |row| (rt::compare(row, "age", CmpOp::Gt, &SqlValue::Int(30)) || rt::compare(row, "name", CmpOp::Eq, &SqlValue::Text("Ann".to_string())))));"#,
        r#"let r2 = || rt::aggregate_rows(r1(), &[] as &[&str], &[Aggregate { func: AggFunc::Count, column: None, output: "n".to_string() }]).into_iter();"#,
        "rows_to_person(r2())",
    ];
    for f in fragments {
        assert!(text.contains(&canonical(f)), "missing {}", f);
    }
}

#[test]
fn test_render_non_finite_literals() {
    use crate::ir::CmpOp;
    use crate::sql_value::SqlValue;
    let mut unit = get_names_unit();
    unit.methods[0].statements[0] = Statement::new(
        Binding::new("r1"),
        Operation::Filter {
            predicate: Predicate::Compare {
                column: "height".to_string(),
                op: CmpOp::Lt,
                value: SqlValue::Real(f64::INFINITY),
            },
        },
        vec![Binding::rows_of("person")],
    );
    let text = canonical(&RustRenderer::new().render(&unit).unwrap());
    assert!(text.contains(&canonical("&SqlValue::Real(f64::INFINITY)")));
    assert!(!text.contains("inf"));
}

#[test]
fn test_render_rejects_unbound_binding() {
    let mut unit = get_names_unit();
    unit.methods[0].statements[0].inputs = vec![Binding::new("r9")];
    assert!(matches!(
        RustRenderer::new().render(&unit),
        Err(Error::UnboundBinding { .. })
    ));
}

#[test]
fn test_render_rejects_bad_method_name() {
    let mut unit = get_names_unit();
    unit.methods[0].name = "1stPerson".to_string();
    assert!(matches!(
        RustRenderer::new().render(&unit),
        Err(Error::InvalidIdentifier(_))
    ));
}

#[test]
fn test_render_rejects_keyword_parameter() {
    let mut unit = get_names_unit();
    let p = &mut unit.methods[0].parameters[0];
    p.ident = "match".to_string();
    p.type_name = "model.Match".to_string();
    p.rows = Binding::rows_of("match");
    unit.methods[0].statements[0].inputs = vec![Binding::rows_of("match")];
    match RustRenderer::new().render(&unit) {
        Err(Error::InvalidIdentifier(name)) => assert_eq!(name, "match"),
        other => panic!("expected an invalid identifier, got {:?}", other),
    }
}

#[test]
fn test_render_rejects_colliding_method_names() {
    let mut unit = get_names_unit();
    let mut other = unit.methods[0].clone();
    unit.methods[0].name = "getAll".to_string();
    other.name = "get_all".to_string();
    unit.methods.push(other);
    match RustRenderer::new().render(&unit) {
        Err(Error::DuplicateMethod {
            name,
            first,
            second,
        }) => {
            assert_eq!(name, "get_all");
            assert_eq!(first, "getAll");
            assert_eq!(second, "get_all");
        }
        other => panic!("expected a duplicate method, got {:?}", other),
    }
}

#[test]
fn test_render_rejects_wrong_input_count() {
    let mut unit = get_names_unit();
    unit.methods[0].statements[0].inputs = vec![];
    assert!(matches!(
        RustRenderer::new().render(&unit),
        Err(Error::WrongInputCount {
            expected: 1,
            actual: 0,
            ..
        })
    ));
}

#[test]
fn test_persist_replaces_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out").join("person_dao.rs");
    persist(&path, "first").unwrap();
    persist(&path, "second").unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
    // Only the target remains; the temporary file was renamed over it.
    assert_eq!(std::fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
}
