//! Form validation for new café records.
//!
//! Validation is a plain function over a declarative `(field, rules)` list.
//! It either hands back the normalized form values or a map of per-field
//! error messages ready for re-rendering the form.

use crate::cafes::NewCafe;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Per-field error messages, keyed by field name.
pub type ValidationErrors = HashMap<String, Vec<String>>;

/// A single validation rule for one field.
#[derive(Clone, Debug)]
pub enum Rule {
    /// The field must be present and contain more than whitespace.
    Required,
    /// At most this many characters.
    MaxLength(usize),
    /// Syntactically a URL: scheme, dotted host, optional port/path/query.
    Url,
    /// Numeric, within this inclusive range.
    NumberRange { min: f64, max: f64 },
}

static URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i)[a-z][a-z0-9+.\-]*://[^\s/?#]+\.[^\s/?#]+([/?#]\S*)?$").unwrap()
});

/// The rule table for the add-café form.
pub fn add_cafe_rules() -> Vec<(&'static str, Vec<Rule>)> {
    vec![
        ("name", vec![Rule::Required, Rule::MaxLength(200)]),
        ("map_url", vec![Rule::Required, Rule::MaxLength(450), Rule::Url]),
        ("img_url", vec![Rule::Required, Rule::MaxLength(450), Rule::Url]),
        ("location", vec![Rule::Required, Rule::MaxLength(200)]),
        ("seats", vec![Rule::Required, Rule::MaxLength(200)]),
        (
            "coffee_price",
            vec![Rule::Required, Rule::NumberRange { min: 1.0, max: 100.0 }],
        ),
    ]
}

/// Runs `rules` against `input`. A failed `Required` short-circuits the
/// rest of that field's rules; any other failing rules all collect their
/// messages, in rule order.
pub fn apply_rules(
    input: &HashMap<String, String>,
    rules: &[(&'static str, Vec<Rule>)],
) -> ValidationErrors {
    let mut errors: ValidationErrors = HashMap::new();
    for (field, field_rules) in rules {
        let value = input.get(*field).map(String::as_str).unwrap_or("");
        let mut messages = Vec::new();
        for rule in field_rules {
            match rule {
                Rule::Required => {
                    // A blank submission includes whitespace-only input.
                    if value.trim().is_empty() {
                        messages.push("This field is required.".to_string());
                        break;
                    }
                }
                Rule::MaxLength(max) => {
                    if value.chars().count() > *max {
                        messages
                            .push(format!("Field cannot be longer than {} characters.", max));
                    }
                }
                Rule::Url => {
                    if !URL_RE.is_match(value) {
                        messages.push("Invalid URL.".to_string());
                    }
                }
                Rule::NumberRange { min, max } => match value.trim().parse::<f64>() {
                    Ok(number) => {
                        if !(number >= *min && number <= *max) {
                            messages
                                .push(format!("Number must be between {} and {}.", min, max));
                        }
                    }
                    Err(_) => messages.push("Not a valid float value.".to_string()),
                },
            }
        }
        if !messages.is_empty() {
            errors.insert(field.to_string(), messages);
        }
    }
    errors
}

/// HTML checkbox semantics: an absent field or a false-y value is `false`,
/// anything else submitted is `true`.
pub fn checkbox_checked(input: &HashMap<String, String>, field: &str) -> bool {
    match input.get(field) {
        Some(value) => !value.is_empty() && value != "false",
        None => false,
    }
}

/// The values of a successfully validated add-café submission.
#[derive(Clone, Debug, PartialEq)]
pub struct AddCafeForm {
    pub name: String,
    pub map_url: String,
    pub img_url: String,
    pub location: String,
    pub seats: String,
    pub has_toilet: bool,
    pub has_wifi: bool,
    pub has_sockets: bool,
    pub can_take_calls: bool,
    pub coffee_price: f64,
}

impl AddCafeForm {
    /// The store-facing record. `coffee_price` becomes a currency-prefixed
    /// display string here; it is never parsed back into a number. Whole
    /// numbers keep one decimal place, so `3` is stored as `£3.0`.
    pub fn into_new_cafe(self) -> NewCafe {
        let coffee_price = if self.coffee_price.fract() == 0.0 {
            format!("£{:.1}", self.coffee_price)
        } else {
            format!("£{}", self.coffee_price)
        };
        NewCafe {
            name: self.name,
            map_url: self.map_url,
            img_url: self.img_url,
            location: self.location,
            seats: Some(self.seats),
            has_toilet: self.has_toilet,
            has_wifi: self.has_wifi,
            has_sockets: self.has_sockets,
            can_take_calls: self.can_take_calls,
            coffee_price: Some(coffee_price),
        }
    }
}

/// Validates a raw submission against `add_cafe_rules`. Either every field
/// passes and the accepted values come back verbatim, or the caller gets
/// the per-field messages to render.
pub fn validate_add_cafe(input: &HashMap<String, String>) -> Result<AddCafeForm, ValidationErrors> {
    let errors = apply_rules(input, &add_cafe_rules());
    if !errors.is_empty() {
        return Err(errors);
    }

    let text = |field: &str| input.get(field).cloned().unwrap_or_default();
    // apply_rules guarantees coffee_price is present and parses.
    let coffee_price = input
        .get("coffee_price")
        .and_then(|raw| raw.trim().parse::<f64>().ok())
        .unwrap_or_default();

    Ok(AddCafeForm {
        name: text("name"),
        map_url: text("map_url"),
        img_url: text("img_url"),
        location: text("location"),
        seats: text("seats"),
        has_toilet: checkbox_checked(input, "has_toilet"),
        has_wifi: checkbox_checked(input, "has_wifi"),
        has_sockets: checkbox_checked(input, "has_sockets"),
        can_take_calls: checkbox_checked(input, "can_take_calls"),
        coffee_price,
    })
}
