//! Walks every string-bearing constant of a decoded class.
//!
//! Visiting order: class annotations; then per method its instructions
//! (`ldc` strings, string-concatenation bootstrap arguments), its
//! annotations, parameter annotations and annotation default; then per field
//! its constant value and annotations.

use std::fmt;
use std::ops::AddAssign;

use serde::Serialize;

use crate::classfile::{
    Annotation, ClassTree, Constant, ElementValue, FieldDecl, Instruction, MethodDecl,
    MethodHandle, StringSite,
};
use crate::tokens::{TokenMap, substitute};

/// Owner of the bootstrap method javac uses for string concatenation.
pub const STRING_CONCAT_FACTORY: &str = "java/lang/invoke/StringConcatFactory";
/// The only factory method whose arguments carry string templates.
pub const MAKE_CONCAT_WITH_CONSTANTS: &str = "makeConcatWithConstants";

/// Where a string site lives, for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteLocation<'a> {
    ClassAnnotation,
    LoadConstant {
        method: &'a str,
        descriptor: &'a str,
        offset: u32,
    },
    ConcatArgument {
        method: &'a str,
        descriptor: &'a str,
        offset: u32,
        argument: usize,
    },
    MethodAnnotation {
        method: &'a str,
        descriptor: &'a str,
    },
    ParameterAnnotation {
        method: &'a str,
        descriptor: &'a str,
        parameter: usize,
    },
    AnnotationDefault {
        method: &'a str,
        descriptor: &'a str,
    },
    FieldConstant {
        field: &'a str,
    },
    FieldAnnotation {
        field: &'a str,
    },
}

impl fmt::Display for SiteLocation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SiteLocation::ClassAnnotation => write!(f, "class annotation"),
            SiteLocation::LoadConstant {
                method,
                descriptor,
                offset,
            } => write!(f, "{method}{descriptor} @{offset} ldc"),
            SiteLocation::ConcatArgument {
                method,
                descriptor,
                offset,
                argument,
            } => write!(f, "{method}{descriptor} @{offset} concat argument {argument}"),
            SiteLocation::MethodAnnotation { method, descriptor } => {
                write!(f, "{method}{descriptor} annotation")
            }
            SiteLocation::ParameterAnnotation {
                method,
                descriptor,
                parameter,
            } => write!(f, "{method}{descriptor} parameter {parameter} annotation"),
            SiteLocation::AnnotationDefault { method, descriptor } => {
                write!(f, "{method}{descriptor} annotation default")
            }
            SiteLocation::FieldConstant { field } => write!(f, "field {field} constant"),
            SiteLocation::FieldAnnotation { field } => write!(f, "field {field} annotation"),
        }
    }
}

/// Per-class result of a walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VisitSummary {
    /// String sites seen.
    pub sites: usize,
    /// Sites whose visitor reported a change.
    pub rewritten: usize,
}

impl VisitSummary {
    pub fn changed(&self) -> bool {
        self.rewritten > 0
    }
}

impl AddAssign for VisitSummary {
    fn add_assign(&mut self, other: Self) {
        self.sites += other.sites;
        self.rewritten += other.rewritten;
    }
}

pub fn is_string_concat(handle: &MethodHandle) -> bool {
    handle.owner == STRING_CONCAT_FACTORY && handle.name == MAKE_CONCAT_WITH_CONSTANTS
}

/// Applies the token map to every string site of the class.
pub fn replace_tokens(tree: &mut ClassTree, tokens: &TokenMap) -> VisitSummary {
    walk_sites(tree, &mut |_, site| {
        let (text, changed) = substitute(&site.value, tokens);
        if changed {
            site.value = text;
        }
        changed
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteRecord {
    pub location: String,
    pub value: String,
}

/// Lists the sites `replace_tokens` would visit, without changing them.
///
/// The borrow is mutable only because the listing shares `walk_sites` with
/// `replace_tokens`; the visitor returns `false` and never writes a site.
pub fn list_sites(tree: &mut ClassTree) -> Vec<SiteRecord> {
    let mut records = Vec::new();
    walk_sites(tree, &mut |location, site| {
        records.push(SiteRecord {
            location: location.to_string(),
            value: site.value.clone(),
        });
        false
    });
    records
}

/// Calls `visit` on every rewritable string site; `visit` returns whether it
/// changed the site.
pub fn walk_sites(
    tree: &mut ClassTree,
    visit: &mut impl FnMut(SiteLocation<'_>, &mut StringSite) -> bool,
) -> VisitSummary {
    let mut summary = VisitSummary::default();
    summary += annotations(
        &mut tree.visible_annotations,
        SiteLocation::ClassAnnotation,
        visit,
    );
    summary += annotations(
        &mut tree.invisible_annotations,
        SiteLocation::ClassAnnotation,
        visit,
    );
    for method in &mut tree.methods {
        summary += method_sites(method, visit);
    }
    for field in &mut tree.fields {
        summary += field_sites(field, visit);
    }
    summary
}

fn method_sites(
    method: &mut MethodDecl,
    visit: &mut impl FnMut(SiteLocation<'_>, &mut StringSite) -> bool,
) -> VisitSummary {
    let MethodDecl {
        name,
        descriptor,
        instructions,
        visible_annotations,
        invisible_annotations,
        visible_parameter_annotations,
        invisible_parameter_annotations,
        annotation_default,
        ..
    } = method;
    let (method, descriptor) = (name.as_str(), descriptor.as_str());

    let mut summary = VisitSummary::default();
    for insn in instructions.iter_mut() {
        match insn {
            Instruction::LoadConstant {
                offset,
                constant: Constant::String(site),
                ..
            } => {
                let location = SiteLocation::LoadConstant {
                    method,
                    descriptor,
                    offset: *offset,
                };
                summary += site_visit(location, site, visit);
            }
            Instruction::InvokeDynamic {
                offset,
                bootstrap,
                arguments,
                ..
            } => {
                if !is_string_concat(bootstrap) {
                    continue;
                }
                for (argument, constant) in arguments.iter_mut().enumerate() {
                    if let Constant::String(site) = constant {
                        let location = SiteLocation::ConcatArgument {
                            method,
                            descriptor,
                            offset: *offset,
                            argument,
                        };
                        summary += site_visit(location, site, visit);
                    }
                }
            }
            _ => {}
        }
    }

    let location = SiteLocation::MethodAnnotation { method, descriptor };
    summary += annotations(visible_annotations, location, visit);
    summary += annotations(invisible_annotations, location, visit);

    for parameters in [visible_parameter_annotations, invisible_parameter_annotations] {
        for (parameter, list) in parameters.iter_mut().enumerate() {
            let location = SiteLocation::ParameterAnnotation {
                method,
                descriptor,
                parameter,
            };
            summary += annotations(list, location, visit);
        }
    }

    if let Some(value) = annotation_default {
        let location = SiteLocation::AnnotationDefault { method, descriptor };
        summary += element(value, location, visit);
    }
    summary
}

fn field_sites(
    field: &mut FieldDecl,
    visit: &mut impl FnMut(SiteLocation<'_>, &mut StringSite) -> bool,
) -> VisitSummary {
    let FieldDecl {
        name,
        constant,
        visible_annotations,
        invisible_annotations,
        ..
    } = field;
    let field = name.as_str();

    let mut summary = VisitSummary::default();
    if let Some(Constant::String(site)) = constant {
        summary += site_visit(SiteLocation::FieldConstant { field }, site, visit);
    }
    let location = SiteLocation::FieldAnnotation { field };
    summary += annotations(visible_annotations, location, visit);
    summary += annotations(invisible_annotations, location, visit);
    summary
}

fn site_visit(
    location: SiteLocation<'_>,
    site: &mut StringSite,
    visit: &mut impl FnMut(SiteLocation<'_>, &mut StringSite) -> bool,
) -> VisitSummary {
    VisitSummary {
        sites: 1,
        rewritten: usize::from(visit(location, site)),
    }
}

fn annotations(
    list: &mut [Annotation],
    location: SiteLocation<'_>,
    visit: &mut impl FnMut(SiteLocation<'_>, &mut StringSite) -> bool,
) -> VisitSummary {
    let mut summary = VisitSummary::default();
    for annotation in list {
        summary += annotation_sites(annotation, location, visit);
    }
    summary
}

fn annotation_sites(
    annotation: &mut Annotation,
    location: SiteLocation<'_>,
    visit: &mut impl FnMut(SiteLocation<'_>, &mut StringSite) -> bool,
) -> VisitSummary {
    let mut summary = VisitSummary::default();
    for pair in &mut annotation.elements {
        summary += element(&mut pair.value, location, visit);
    }
    summary
}

fn element(
    value: &mut ElementValue,
    location: SiteLocation<'_>,
    visit: &mut impl FnMut(SiteLocation<'_>, &mut StringSite) -> bool,
) -> VisitSummary {
    match value {
        ElementValue::String(site) => site_visit(location, site, visit),
        ElementValue::Array(values) => {
            let mut summary = VisitSummary::default();
            for v in values {
                summary += element(v, location, visit);
            }
            summary
        }
        ElementValue::Annotation(nested) => annotation_sites(nested, location, visit),
        ElementValue::OpaqueString
        | ElementValue::Scalar { .. }
        | ElementValue::Enum { .. }
        | ElementValue::Class(_) => VisitSummary::default(),
    }
}
