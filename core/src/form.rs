//! Form model binding settings blobs to typed controls
//!
//! A [`FormModel`] is built once from a schema (see [`crate::schema`]) and
//! then read with [`FormModel::collect`] and written with
//! [`FormModel::apply`]. Checkboxes produce booleans; every other control
//! produces its string value, so `""` and `"0"` survive a round trip.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{Error, Result, SettingValue, SettingsBlob};

/// Kind of input control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlKind {
    Text,
    Number,
    Password,
    Textarea,
    Checkbox,
    Select { options: Vec<String> },
}

impl ControlKind {
    pub fn is_checkbox(&self) -> bool {
        matches!(self, ControlKind::Checkbox)
    }
}

/// Current state of a control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlState {
    Checked(bool),
    Value(String),
}

/// Declaration of a single control
#[derive(Debug, Clone, PartialEq)]
pub struct ControlSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: ControlKind,
    pub default: ControlState,
    pub required: bool,
}

impl ControlSpec {
    pub fn text(name: &'static str, label: &'static str, default: &str) -> Self {
        Self {
            name,
            label,
            kind: ControlKind::Text,
            default: ControlState::Value(default.to_string()),
            required: false,
        }
    }

    pub fn number(name: &'static str, label: &'static str, default: &str) -> Self {
        Self {
            kind: ControlKind::Number,
            ..Self::text(name, label, default)
        }
    }

    pub fn password(name: &'static str, label: &'static str) -> Self {
        Self {
            kind: ControlKind::Password,
            ..Self::text(name, label, "")
        }
    }

    pub fn textarea(name: &'static str, label: &'static str, default: &str) -> Self {
        Self {
            kind: ControlKind::Textarea,
            ..Self::text(name, label, default)
        }
    }

    pub fn checkbox(name: &'static str, label: &'static str, default: bool) -> Self {
        Self {
            name,
            label,
            kind: ControlKind::Checkbox,
            default: ControlState::Checked(default),
            required: false,
        }
    }

    pub fn select(name: &'static str, label: &'static str, options: &[&str], default: &str) -> Self {
        Self {
            kind: ControlKind::Select {
                options: options.iter().map(|o| o.to_string()).collect(),
            },
            ..Self::text(name, label, default)
        }
    }

    /// Mark the control as required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

#[derive(Debug, Clone)]
struct Control {
    spec: ControlSpec,
    state: ControlState,
}

/// Structured form bound to one settings domain
#[derive(Debug, Clone, Default)]
pub struct FormModel {
    controls: BTreeMap<&'static str, Control>,
    order: Vec<&'static str>,
}

impl FormModel {
    /// Build a form from control declarations, every control at its default
    pub fn new(specs: Vec<ControlSpec>) -> Self {
        let mut form = FormModel::default();
        for spec in specs {
            if form.controls.contains_key(spec.name) {
                continue;
            }
            form.order.push(spec.name);
            form.controls.insert(
                spec.name,
                Control {
                    state: spec.default.clone(),
                    spec,
                },
            );
        }
        form
    }

    /// Control names in declaration order
    pub fn names(&self) -> Vec<&'static str> {
        self.order.clone()
    }

    pub fn has_control(&self, name: &str) -> bool {
        self.controls.contains_key(name)
    }

    pub fn spec(&self, name: &str) -> Option<&ControlSpec> {
        self.controls.get(name).map(|c| &c.spec)
    }

    pub fn state(&self, name: &str) -> Option<&ControlState> {
        self.controls.get(name).map(|c| &c.state)
    }

    /// Text value of a non-checkbox control
    pub fn value(&self, name: &str) -> Option<&str> {
        match self.state(name)? {
            ControlState::Value(v) => Some(v.as_str()),
            ControlState::Checked(_) => None,
        }
    }

    /// Checked state of a checkbox control
    pub fn is_checked(&self, name: &str) -> Option<bool> {
        match self.state(name)? {
            ControlState::Checked(b) => Some(*b),
            ControlState::Value(_) => None,
        }
    }

    /// Set a single control from a primitive; returns false for unknown names
    pub fn set(&mut self, name: &str, value: impl Into<SettingValue>) -> bool {
        let Some(control) = self.controls.get_mut(name) else {
            return false;
        };
        let value = value.into();
        control.state = if control.spec.kind.is_checkbox() {
            ControlState::Checked(value.as_bool())
        } else {
            ControlState::Value(value.as_text())
        };
        true
    }

    /// Read the named controls into a blob; unknown names are skipped
    pub fn collect<S: AsRef<str>>(&self, names: &[S]) -> SettingsBlob {
        let mut blob = SettingsBlob::new();
        for name in names {
            let name = name.as_ref();
            if let Some(control) = self.controls.get(name) {
                match &control.state {
                    ControlState::Checked(b) => blob.insert(name, *b),
                    ControlState::Value(v) => blob.insert(name, v.as_str()),
                }
            }
        }
        blob
    }

    /// Read every control into a blob
    pub fn collect_all(&self) -> SettingsBlob {
        self.collect(&self.order)
    }

    /// Write blob values onto matching controls; unknown keys are ignored
    ///
    /// Returns the number of controls touched.
    pub fn apply(&mut self, blob: &SettingsBlob) -> usize {
        let mut touched = 0;
        for (key, value) in blob.iter() {
            if self.set(key, value.clone()) {
                touched += 1;
            }
        }
        touched
    }

    /// Reset every control to its declared default
    pub fn reset(&mut self) {
        for control in self.controls.values_mut() {
            control.state = control.spec.default.clone();
        }
    }

    /// Reset to defaults, then apply the blob
    ///
    /// This is the page-load path: keys missing from the blob end up at
    /// their declared defaults.
    pub fn populate(&mut self, blob: &SettingsBlob) {
        self.reset();
        self.apply(blob);
    }

    /// Check that the named controls are present and non-empty
    ///
    /// For checkboxes "present" means checked. The error message names the
    /// first offending control by label.
    pub fn require<S: AsRef<str>>(&self, names: &[S]) -> Result<()> {
        for name in names {
            let name = name.as_ref();
            let control = self
                .controls
                .get(name)
                .ok_or_else(|| Error::ValidationError(format!("{} is required", name)))?;
            let filled = match &control.state {
                ControlState::Checked(b) => *b,
                ControlState::Value(v) => !v.trim().is_empty(),
            };
            if !filled {
                return Err(Error::ValidationError(format!(
                    "{} is required",
                    control.spec.label
                )));
            }
        }
        Ok(())
    }

    /// Check every control marked required, plus select option membership
    pub fn validate(&self) -> Result<()> {
        let required: Vec<&str> = self
            .order
            .iter()
            .copied()
            .filter(|n| self.controls.get(n).is_some_and(|c| c.spec.required))
            .collect();
        self.require(&required)?;

        for name in &self.order {
            let Some(control) = self.controls.get(name) else {
                continue;
            };
            if let (ControlKind::Select { options }, ControlState::Value(v)) =
                (&control.spec.kind, &control.state)
            {
                if !options.iter().any(|o| o == v) {
                    return Err(Error::ValidationError(format!(
                        "{} must be one of: {}",
                        control.spec.label,
                        options.join(", ")
                    )));
                }
            }
            if let (ControlKind::Number, ControlState::Value(v)) =
                (&control.spec.kind, &control.state)
            {
                if !v.trim().is_empty() && v.trim().parse::<f64>().is_err() {
                    return Err(Error::ValidationError(format!(
                        "{} must be a number",
                        control.spec.label
                    )));
                }
            }
        }
        Ok(())
    }
}
