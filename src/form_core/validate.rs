use crate::errors::{FieldError, FieldErrors, SchemaError};
use crate::model::{Field, FieldType, FieldValue, FormDefinition};
use chrono::NaiveDate;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;

static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
static TEL_RE: OnceLock<Regex> = OnceLock::new();

fn email_re() -> &'static Regex {
    EMAIL_RE.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@.]+(\.[^\s@.]+)+$").expect("static email pattern")
    })
}

fn tel_re() -> &'static Regex {
    TEL_RE.get_or_init(|| Regex::new(r"^\+?[0-9()\-. ]+$").expect("static tel pattern"))
}

/// Decide whether `value` is acceptable for `field`. `None` means the field was left unset.
pub fn validate(field: &Field, value: Option<&FieldValue>) -> Result<(), FieldError> {
    let empty = value.map(|v| v.is_empty()).unwrap_or(true);
    if empty {
        if field.required {
            return Err(FieldError::Required);
        }
        return Ok(());
    }
    let Some(value) = value else {
        return Ok(());
    };
    match field.kind {
        FieldType::Text | FieldType::Textarea => {
            // Counted on the trimmed text, which is what the payload carries
            let s = expect_text(value)?;
            check_length(field, s.trim())
        }
        FieldType::Email => {
            let s = expect_text(value)?.trim();
            if email_re().is_match(s) {
                Ok(())
            } else {
                Err(FieldError::InvalidEmail)
            }
        }
        FieldType::Number => {
            let n = parse_number(value)?;
            if let Some(min) = field.min {
                if n < min {
                    return Err(FieldError::BelowMin(min));
                }
            }
            if let Some(max) = field.max {
                if n > max {
                    return Err(FieldError::AboveMax(max));
                }
            }
            Ok(())
        }
        FieldType::Select | FieldType::Radio => {
            let s = expect_text(value)?;
            if field.options.iter().any(|o| o == s) {
                Ok(())
            } else {
                Err(FieldError::NotAnOption(s.to_string()))
            }
        }
        FieldType::Checkbox => match value {
            FieldValue::Bool(_) if field.options.is_empty() => Ok(()),
            FieldValue::List(items) if !field.options.is_empty() => {
                match items.iter().find(|it| !field.options.contains(it)) {
                    Some(bad) => Err(FieldError::NotAnOption(bad.clone())),
                    None => Ok(()),
                }
            }
            _ if field.options.is_empty() => Err(FieldError::WrongType("a yes/no toggle")),
            _ => Err(FieldError::WrongType("a list of options")),
        },
        FieldType::Date => {
            let s = expect_text(value)?.trim();
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(|_| ())
                .map_err(|_| FieldError::InvalidDate)
        }
        FieldType::Tel => {
            let s = expect_text(value)?.trim();
            let digits = s.chars().filter(|c| c.is_ascii_digit()).count();
            if tel_re().is_match(s) && (7..=15).contains(&digits) {
                Ok(())
            } else {
                Err(FieldError::InvalidPhone)
            }
        }
        FieldType::Url => {
            let s = expect_text(value)?.trim();
            match url::Url::parse(s) {
                Ok(u) if (u.scheme() == "http" || u.scheme() == "https") && u.has_host() => {
                    Ok(())
                }
                _ => Err(FieldError::InvalidUrl),
            }
        }
    }
}

fn expect_text(value: &FieldValue) -> Result<&str, FieldError> {
    value.as_text().ok_or(FieldError::WrongType("text"))
}

/// Numbers arrive typed from the API or as text from the editor.
pub fn parse_number(value: &FieldValue) -> Result<f64, FieldError> {
    match value {
        FieldValue::Number(n) if n.is_finite() => Ok(*n),
        FieldValue::Text(s) => match s.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(n),
            _ => Err(FieldError::NotANumber),
        },
        _ => Err(FieldError::NotANumber),
    }
}

fn check_length(field: &Field, s: &str) -> Result<(), FieldError> {
    let n = s.chars().count();
    if let Some(min) = field.min {
        let min = min.max(0.0).ceil() as usize;
        if n < min {
            return Err(FieldError::TooShort(min));
        }
    }
    if let Some(max) = field.max {
        let max = max.max(0.0).floor() as usize;
        if n > max {
            return Err(FieldError::TooLong(max));
        }
    }
    Ok(())
}

/// Run `validate` over every field in definition order; never stops at the first failure.
pub fn validate_all(def: &FormDefinition, values: &BTreeMap<String, FieldValue>) -> FieldErrors {
    let mut errors = FieldErrors::default();
    for field in def.fields() {
        if let Err(e) = validate(field, values.get(&field.id)) {
            errors.push(field.id.clone(), e);
        }
    }
    errors
}

/// Structural checks on a whole definition.
pub fn validate_definition(def: &FormDefinition) -> Result<(), SchemaError> {
    if def.title.trim().is_empty() {
        return Err(SchemaError::EmptyTitle);
    }
    let mut section_ids = HashSet::new();
    // Submission data is keyed by field id, so ids must be unique form-wide
    let mut field_ids = HashSet::new();
    for section in &def.sections {
        if section.id.is_empty() {
            return Err(SchemaError::EmptyId);
        }
        if !section_ids.insert(section.id.as_str()) {
            return Err(SchemaError::DuplicateSection(section.id.clone()));
        }
        if section.title.trim().is_empty() {
            return Err(SchemaError::EmptySectionTitle(section.id.clone()));
        }
        for field in &section.fields {
            validate_field_schema(field)?;
            if !field_ids.insert(field.id.as_str()) {
                return Err(SchemaError::DuplicateField(field.id.clone()));
            }
        }
    }
    Ok(())
}

/// Checks that apply to one field in isolation.
pub fn validate_field_schema(field: &Field) -> Result<(), SchemaError> {
    if field.id.is_empty() {
        return Err(SchemaError::EmptyId);
    }
    if field.label.trim().is_empty() {
        return Err(SchemaError::EmptyLabel(field.id.clone()));
    }
    if field.kind.needs_options() && field.options.is_empty() {
        return Err(SchemaError::MissingOptions(field.id.clone()));
    }
    if let (Some(min), Some(max)) = (field.min, field.max) {
        if min > max {
            return Err(SchemaError::InvertedRange {
                field: field.id.clone(),
                min,
                max,
            });
        }
    }
    Ok(())
}
