//! Form schema — the ordered set of fillable fields of the target form.
//!
//! A template is either a PDF with an AcroForm dictionary or a JSON schema
//! document. Every field name is canonicalized with `normalize_field_name`;
//! when two raw names collide, the first descriptor wins.

use std::collections::{BTreeMap, HashMap};

use lopdf::{Dictionary, Document, Object};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::form::normalize::normalize_field_name;

/// `/Ff` bit for radio-button groups.
const FLAG_RADIO: i64 = 1 << 15;
/// `/Ff` bit for push buttons, which hold no value.
const FLAG_PUSHBUTTON: i64 = 1 << 16;
/// Field trees deeper than this are treated as malformed.
const MAX_FIELD_DEPTH: usize = 32;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read PDF template: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("PDF template has no AcroForm dictionary")]
    NoAcroForm,

    #[error("invalid JSON schema document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("field '{field}' has unknown kind '{kind}'")]
    UnknownKind { field: String, kind: String },

    #[error("template defines no fillable fields")]
    Empty,
}

/// The kind of a form field, resolved once when the schema is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Boolean,
    Choice { options: Vec<String> },
}

impl FieldKind {
    fn describe(&self) -> String {
        match self {
            FieldKind::Text => "free text".to_string(),
            FieldKind::Boolean => "checkbox (true/false)".to_string(),
            FieldKind::Choice { options } => format!("one of: {}", options.join(", ")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Canonical lookup key.
    pub name: String,
    pub raw_name: String,
    pub kind: FieldKind,
    pub description: Option<String>,
}

impl FieldDescriptor {
    pub fn new(raw_name: &str, kind: FieldKind, description: Option<String>) -> Self {
        Self {
            name: normalize_field_name(raw_name),
            raw_name: raw_name.to_string(),
            kind,
            description,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FormSchema {
    name: String,
    fields: Vec<FieldDescriptor>,
    index: HashMap<String, usize>,
}

#[derive(Debug, Deserialize)]
struct SchemaDocument {
    name: String,
    fields: Vec<RawField>,
}

#[derive(Debug, Deserialize)]
struct RawField {
    name: String,
    kind: String,
    #[serde(default)]
    options: Vec<String>,
    #[serde(default)]
    description: Option<String>,
}

impl FormSchema {
    pub fn new(name: impl Into<String>, descriptors: Vec<FieldDescriptor>) -> Result<Self, SchemaError> {
        let mut fields = Vec::with_capacity(descriptors.len());
        let mut index = HashMap::with_capacity(descriptors.len());
        for descriptor in descriptors {
            if index.contains_key(&descriptor.name) {
                debug!(
                    "Duplicate canonical field name '{}' (raw '{}') — keeping first",
                    descriptor.name, descriptor.raw_name
                );
                continue;
            }
            index.insert(descriptor.name.clone(), fields.len());
            fields.push(descriptor);
        }
        if fields.is_empty() {
            return Err(SchemaError::Empty);
        }
        Ok(Self {
            name: name.into(),
            fields,
            index,
        })
    }

    /// Loads a schema from template bytes: AcroForm PDF or JSON schema document.
    pub fn from_template_bytes(name: &str, bytes: &[u8]) -> Result<Self, SchemaError> {
        if bytes.starts_with(b"%PDF") {
            Self::from_acroform(name, bytes)
        } else {
            Self::from_json(bytes)
        }
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, SchemaError> {
        let document: SchemaDocument = serde_json::from_slice(bytes)?;
        let descriptors = document
            .fields
            .into_iter()
            .map(|raw| {
                let kind = match raw.kind.to_ascii_lowercase().as_str() {
                    "text" => FieldKind::Text,
                    "boolean" | "checkbox" => FieldKind::Boolean,
                    "choice" | "radio" => FieldKind::Choice {
                        options: raw.options,
                    },
                    _ => {
                        return Err(SchemaError::UnknownKind {
                            field: raw.name,
                            kind: raw.kind,
                        })
                    }
                };
                Ok(FieldDescriptor::new(&raw.name, kind, raw.description))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(document.name, descriptors)
    }

    pub fn from_acroform(name: &str, bytes: &[u8]) -> Result<Self, SchemaError> {
        let doc = Document::load_mem(bytes)?;
        let catalog = resolve(&doc, doc.trailer.get(b"Root")?)?.as_dict()?;
        let acroform = catalog.get(b"AcroForm").map_err(|_| SchemaError::NoAcroForm)?;
        let acroform = resolve(&doc, acroform)?.as_dict()?;
        let fields = resolve(&doc, acroform.get(b"Fields")?)?.as_array()?;

        let mut descriptors = Vec::new();
        for field in fields {
            walk_field(&doc, field, None, &Inherited::default(), 0, &mut descriptors)?;
        }
        Self::new(name, descriptors)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, canonical_name: &str) -> Option<&FieldDescriptor> {
        self.index.get(canonical_name).map(|&i| &self.fields[i])
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Canonical name → human description, as sent to the value generation oracle.
    pub fn descriptions(&self) -> BTreeMap<String, String> {
        self.fields
            .iter()
            .map(|field| {
                let description = match &field.description {
                    Some(text) => format!("{text} ({})", field.kind.describe()),
                    None => field.kind.describe(),
                };
                (field.name.clone(), description)
            })
            .collect()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// AcroForm traversal
// ────────────────────────────────────────────────────────────────────────────

/// Field attributes inheritable from parent nodes.
#[derive(Debug, Clone, Default)]
struct Inherited {
    field_type: Option<Vec<u8>>,
    flags: i64,
}

fn walk_field(
    doc: &Document,
    object: &Object,
    parent_name: Option<&str>,
    inherited: &Inherited,
    depth: usize,
    out: &mut Vec<FieldDescriptor>,
) -> Result<(), SchemaError> {
    if depth > MAX_FIELD_DEPTH {
        debug!("AcroForm field tree exceeds depth {MAX_FIELD_DEPTH}; truncating");
        return Ok(());
    }
    let dict = resolve(doc, object)?.as_dict()?;

    let partial = dict.get(b"T").ok().and_then(text_string);
    let full_name = match (parent_name, partial) {
        (Some(parent), Some(part)) => format!("{parent}.{part}"),
        (None, Some(part)) => part,
        (Some(parent), None) => parent.to_string(),
        (None, None) => return Ok(()),
    };

    let inherited = Inherited {
        field_type: match dict.get(b"FT") {
            Ok(Object::Name(ft)) => Some(ft.clone()),
            _ => inherited.field_type.clone(),
        },
        flags: dict
            .get(b"Ff")
            .and_then(Object::as_i64)
            .unwrap_or(inherited.flags),
    };

    let kids = match dict.get(b"Kids") {
        Ok(kids) => resolve(doc, kids)?.as_array()?.as_slice(),
        Err(_) => &[],
    };
    let child_fields: Vec<&Object> = kids
        .iter()
        .filter(|kid| {
            resolve(doc, kid)
                .and_then(Object::as_dict)
                .map(|d| d.has(b"T"))
                .unwrap_or(false)
        })
        .collect();

    if !child_fields.is_empty() {
        for kid in child_fields {
            walk_field(doc, kid, Some(full_name.as_str()), &inherited, depth + 1, out)?;
        }
        return Ok(());
    }

    let description = dict.get(b"TU").ok().and_then(text_string);
    let kind = match inherited.field_type.as_deref() {
        Some(b"Tx") => FieldKind::Text,
        Some(b"Btn") if inherited.flags & FLAG_PUSHBUTTON != 0 => return Ok(()),
        Some(b"Btn") if inherited.flags & FLAG_RADIO != 0 => FieldKind::Choice {
            options: appearance_states(doc, dict, kids),
        },
        Some(b"Btn") => FieldKind::Boolean,
        Some(b"Ch") => FieldKind::Choice {
            options: choice_options(doc, dict),
        },
        _ => return Ok(()),
    };

    out.push(FieldDescriptor::new(&full_name, kind, description));
    Ok(())
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Result<&'a Object, lopdf::Error> {
    match object {
        Object::Reference(id) => doc.get_object(*id),
        other => Ok(other),
    }
}

/// On-states of a radio group's widgets (`/AP /N` keys other than `Off`).
fn appearance_states(doc: &Document, field: &Dictionary, kids: &[Object]) -> Vec<String> {
    let field_object = Object::Dictionary(field.clone());
    let widgets: Vec<&Object> = if kids.is_empty() {
        vec![&field_object]
    } else {
        kids.iter().collect()
    };

    let mut states: Vec<String> = Vec::new();
    for widget in widgets {
        let normal = resolve(doc, widget)
            .and_then(Object::as_dict)
            .and_then(|w| w.get(b"AP"))
            .and_then(|ap| resolve(doc, ap))
            .and_then(Object::as_dict)
            .and_then(|ap| ap.get(b"N"))
            .and_then(|n| resolve(doc, n))
            .and_then(Object::as_dict);
        let Ok(normal) = normal else { continue };
        for (state, _) in normal.iter() {
            if state.as_slice() == b"Off" {
                continue;
            }
            let state = String::from_utf8_lossy(state).into_owned();
            if !states.contains(&state) {
                states.push(state);
            }
        }
    }
    states
}

/// Export values of a combo/list field's `/Opt` array.
fn choice_options(doc: &Document, field: &Dictionary) -> Vec<String> {
    let Ok(options) = field
        .get(b"Opt")
        .and_then(|opt| resolve(doc, opt))
        .and_then(Object::as_array)
    else {
        return Vec::new();
    };

    options
        .iter()
        .filter_map(|option| match resolve(doc, option).ok()? {
            Object::Array(pair) => pair.first().and_then(text_string),
            other => text_string(other),
        })
        .collect()
}

/// Decodes a PDF text string (UTF-16BE with BOM, otherwise byte-wise).
fn text_string(object: &Object) -> Option<String> {
    let Object::String(bytes, _) = object else {
        return None;
    };
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return Some(String::from_utf16_lossy(&units));
    }
    Some(match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    const JSON_SCHEMA: &str = r#"{
        "name": "I-129 O supplement",
        "fields": [
            {"name": "Pt1.FamilyName", "kind": "text", "description": "Family name"},
            {"name": "Pt1.Married", "kind": "checkbox"},
            {"name": "Pt2.Classification", "kind": "choice", "options": ["O1A", "O1B"]},
            {"name": "pt1_familyname", "kind": "text"}
        ]
    }"#;

    #[test]
    fn test_json_schema_loads_and_dedups() {
        let schema = FormSchema::from_json(JSON_SCHEMA.as_bytes()).unwrap();
        assert_eq!(schema.name(), "I-129 O supplement");
        assert_eq!(schema.len(), 3);
        let family = schema.get("pt1_familyname").unwrap();
        assert_eq!(family.raw_name, "Pt1.FamilyName");
        assert_eq!(family.kind, FieldKind::Text);
        assert_eq!(schema.get("pt1_married").unwrap().kind, FieldKind::Boolean);
        assert_eq!(
            schema.get("pt2_classification").unwrap().kind,
            FieldKind::Choice {
                options: vec!["O1A".to_string(), "O1B".to_string()]
            }
        );
    }

    #[test]
    fn test_json_schema_unknown_kind() {
        let err = FormSchema::from_json(br#"{"name": "x", "fields": [{"name": "a", "kind": "date"}]}"#)
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownKind { .. }));
    }

    #[test]
    fn test_empty_schema_rejected() {
        let err = FormSchema::from_json(br#"{"name": "x", "fields": []}"#).unwrap_err();
        assert!(matches!(err, SchemaError::Empty));
    }

    #[test]
    fn test_descriptions_include_kind() {
        let schema = FormSchema::from_json(JSON_SCHEMA.as_bytes()).unwrap();
        let descriptions = schema.descriptions();
        assert_eq!(descriptions["pt1_familyname"], "Family name (free text)");
        assert_eq!(descriptions["pt2_classification"], "one of: O1A, O1B");
    }

    #[test]
    fn test_text_string_decodes_utf16() {
        let object = Object::String(
            vec![0xFE, 0xFF, 0x00, 0x4E, 0x00, 0x61, 0x00, 0x6D, 0x00, 0x65],
            lopdf::StringFormat::Hexadecimal,
        );
        assert_eq!(text_string(&object).as_deref(), Some("Name"));
    }

    fn acroform_pdf() -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => Vec::<Object>::new(),
            "Count" => 0i64,
        });
        let family = doc.add_object(dictionary! {
            "FT" => "Tx",
            "T" => Object::string_literal("FamilyName[0]"),
            "TU" => Object::string_literal("Family name of the beneficiary"),
        });
        let married = doc.add_object(dictionary! {
            "FT" => "Btn",
            "T" => Object::string_literal("Married[0]"),
        });
        let widget_a = doc.add_object(dictionary! {
            "Subtype" => "Widget",
            "AP" => dictionary! { "N" => dictionary! { "O1A" => Object::Null, "Off" => Object::Null } },
        });
        let widget_b = doc.add_object(dictionary! {
            "Subtype" => "Widget",
            "AP" => dictionary! { "N" => dictionary! { "O1B" => Object::Null, "Off" => Object::Null } },
        });
        let basis = doc.add_object(dictionary! {
            "FT" => "Btn",
            "Ff" => FLAG_RADIO,
            "T" => Object::string_literal("Basis[0]"),
            "Kids" => vec![Object::Reference(widget_a), Object::Reference(widget_b)],
        });
        let print = doc.add_object(dictionary! {
            "FT" => "Btn",
            "Ff" => FLAG_PUSHBUTTON,
            "T" => Object::string_literal("Print[0]"),
        });
        let state = doc.add_object(dictionary! {
            "FT" => "Ch",
            "T" => Object::string_literal("State[0]"),
            "Opt" => vec![
                Object::string_literal("CA"),
                Object::Array(vec![Object::string_literal("NY"), Object::string_literal("New York")]),
            ],
        });
        let page1 = doc.add_object(dictionary! {
            "T" => Object::string_literal("Page1[0]"),
            "Kids" => vec![
                Object::Reference(family),
                Object::Reference(married),
                Object::Reference(basis),
                Object::Reference(print),
                Object::Reference(state),
            ],
        });
        let catalog = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages,
            "AcroForm" => dictionary! { "Fields" => vec![Object::Reference(page1)] },
        });
        doc.trailer.set("Root", catalog);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_acroform_fields_resolved_by_kind() {
        let schema = FormSchema::from_template_bytes("i-129", &acroform_pdf()).unwrap();
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "page1_0__familyname_0_",
                "page1_0__married_0_",
                "page1_0__basis_0_",
                "page1_0__state_0_",
            ]
        );

        let family = schema.get("page1_0__familyname_0_").unwrap();
        assert_eq!(family.raw_name, "Page1[0].FamilyName[0]");
        assert_eq!(family.kind, FieldKind::Text);
        assert_eq!(
            family.description.as_deref(),
            Some("Family name of the beneficiary")
        );
        assert_eq!(
            schema.get("page1_0__married_0_").unwrap().kind,
            FieldKind::Boolean
        );
        assert_eq!(
            schema.get("page1_0__basis_0_").unwrap().kind,
            FieldKind::Choice {
                options: vec!["O1A".to_string(), "O1B".to_string()]
            }
        );
        assert_eq!(
            schema.get("page1_0__state_0_").unwrap().kind,
            FieldKind::Choice {
                options: vec!["CA".to_string(), "NY".to_string()]
            }
        );
    }

    #[test]
    fn test_pdf_without_acroform() {
        let mut doc = Document::with_version("1.5");
        let catalog = doc.add_object(dictionary! { "Type" => "Catalog" });
        doc.trailer.set("Root", catalog);
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();

        let err = FormSchema::from_template_bytes("blank", &bytes).unwrap_err();
        assert!(matches!(err, SchemaError::NoAcroForm));
    }
}
