use crate::errors::EditRefused;
use crate::model::{Field, FieldType, FieldValue, FormDefinition, Section};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One rendered control, in render order.
#[derive(Debug, Clone, Copy)]
pub struct Slot<'a> {
    pub section: &'a Section,
    pub field: &'a Field,
    // Position of the field within its section
    pub index: usize,
}

/// In-progress answers for one fill session over an immutable definition snapshot.
#[derive(Debug, Clone)]
pub struct EditState {
    definition: Arc<FormDefinition>,
    values: BTreeMap<String, FieldValue>,
    initial: BTreeMap<String, FieldValue>,
    pub preview: bool,
}

impl EditState {
    /// Seed values from each field's `defaultValue`, then overlay `defaults` for matching ids.
    pub fn initialize(
        definition: Arc<FormDefinition>,
        defaults: &BTreeMap<String, FieldValue>,
    ) -> Self {
        let mut values = BTreeMap::new();
        for field in definition.fields() {
            if let Some(v) = &field.default_value {
                values.insert(field.id.clone(), v.clone());
            }
            if let Some(v) = defaults.get(&field.id) {
                values.insert(field.id.clone(), v.clone());
            }
        }
        Self {
            initial: values.clone(),
            definition,
            values,
            preview: false,
        }
    }

    pub fn definition(&self) -> &Arc<FormDefinition> {
        &self.definition
    }

    pub fn values(&self) -> &BTreeMap<String, FieldValue> {
        &self.values
    }

    pub fn value(&self, field_id: &str) -> Option<&FieldValue> {
        self.values.get(field_id)
    }

    pub fn set_value(&mut self, field_id: &str, value: FieldValue) -> Result<(), EditRefused> {
        if self.definition.find_field(field_id).is_none() {
            return Err(EditRefused::UnknownField(field_id.to_string()));
        }
        self.values.insert(field_id.to_string(), value);
        Ok(())
    }

    pub fn clear(&mut self, field_id: &str) -> Result<(), EditRefused> {
        if self.definition.find_field(field_id).is_none() {
            return Err(EditRefused::UnknownField(field_id.to_string()));
        }
        self.values.remove(field_id);
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.values != self.initial
    }

    #[allow(dead_code)]
    pub fn reset(&mut self) {
        self.values = self.initial.clone();
    }

    /// Fields in `sections[].fields[]` order.
    pub fn slots(&self) -> Vec<Slot<'_>> {
        self.definition
            .sections
            .iter()
            .flat_map(|section| {
                section
                    .fields
                    .iter()
                    .enumerate()
                    .map(move |(index, field)| Slot {
                        section,
                        field,
                        index,
                    })
            })
            .collect()
    }

    /// Answers as they go on the wire: number fields typed, unset optionals dropped.
    pub fn payload_data(&self) -> BTreeMap<String, FieldValue> {
        let mut data = BTreeMap::new();
        for field in self.definition.fields() {
            let Some(v) = self.values.get(&field.id) else {
                continue;
            };
            if v.is_empty() && !field.is_toggle() {
                continue;
            }
            let v = match (field.kind, v) {
                (FieldType::Number, FieldValue::Text(s)) => s
                    .trim()
                    .parse::<f64>()
                    .map(FieldValue::Number)
                    .unwrap_or_else(|_| v.clone()),
                (_, FieldValue::Text(s)) => FieldValue::Text(s.trim().to_string()),
                _ => v.clone(),
            };
            data.insert(field.id.clone(), v);
        }
        data
    }
}

/// Guest identity pre-fills fields whose id is `name` or `email`.
pub fn guest_defaults(name: Option<&str>, email: Option<&str>) -> BTreeMap<String, FieldValue> {
    let mut out = BTreeMap::new();
    if let Some(n) = name.filter(|s| !s.is_empty()) {
        out.insert("name".to_string(), FieldValue::text(n));
    }
    if let Some(e) = email.filter(|s| !s.is_empty()) {
        out.insert("email".to_string(), FieldValue::text(e));
    }
    out
}
