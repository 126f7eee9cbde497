//! The site's request handlers: list cafés, add one, delete one.

use crate::cafes::{Cafe, StoreError};
use crate::forms;
use crate::router::{AppState, Method, Request, Response};
use crate::template::{TemplateValue, render_template};
use log::{error, info};
use std::collections::HashMap;

/// GET `/`: every café, in insertion order.
pub async fn home(_req: Request, state: AppState) -> Response {
    let cafes = match state.store.list_all().await {
        Ok(cafes) => cafes,
        Err(e) => {
            error!("Listing cafes failed: {}", e);
            return Response::server_error("could not load the cafe list");
        }
    };

    let mut context = HashMap::new();
    context.insert(
        "has_cafes".to_string(),
        TemplateValue::Bool(!cafes.is_empty()),
    );
    context.insert(
        "cafe_count".to_string(),
        TemplateValue::Number(cafes.len() as f64),
    );
    context.insert(
        "cafes".to_string(),
        TemplateValue::List(cafes.iter().map(cafe_context).collect()),
    );
    render_template(&state.settings.template.dir, "index.html", &context)
}

/// GET and POST `/add`: the add-café form.
///
/// A valid submission is stored and answered with a redirect to `/`. An
/// invalid one re-renders the form with the entered values and per-field
/// messages. A duplicate name is deliberately not a form error: the store
/// refuses it and the request fails with a server error.
pub async fn add(req: Request, state: AppState) -> Response {
    if req.method != Method::Post {
        let context = HashMap::new();
        return render_template(&state.settings.template.dir, "add.html", &context);
    }

    let form = match forms::validate_add_cafe(&req.form) {
        Ok(form) => form,
        Err(errors) => {
            let context = form_context(&req.form, &errors);
            return render_template(&state.settings.template.dir, "add.html", &context);
        }
    };

    match state.store.create(form.into_new_cafe()).await {
        Ok(cafe) => {
            info!("Added cafe `{}` as id {}", cafe.name, cafe.id);
            Response::redirect("/")
        }
        Err(e @ StoreError::UniqueViolation(_)) => {
            error!("Adding cafe failed: {}", e);
            Response::server_error("a cafe with this name already exists")
        }
        Err(e) => {
            error!("Adding cafe failed: {}", e);
            Response::server_error("could not store the new cafe")
        }
    }
}

/// GET `/delete/:cafe_id`: drop a café and go back to the list. An id
/// nothing is stored under redirects all the same.
pub async fn delete(req: Request, state: AppState) -> Response {
    let raw = req.params.get("cafe_id").map(String::as_str).unwrap_or("");
    let cafe_id: i64 = match raw.parse() {
        Ok(id) => id,
        Err(_) => return Response::bad_request("cafe id must be an integer"),
    };

    if let Err(e) = state.store.delete_by_id(cafe_id).await {
        error!("Deleting cafe {} failed: {}", cafe_id, e);
        return Response::server_error("could not delete the cafe");
    }
    Response::redirect("/")
}

/// Maps one record into the context shape `index.html` renders.
fn cafe_context(cafe: &Cafe) -> TemplateValue {
    let mut object = HashMap::new();
    object.insert("id".to_string(), TemplateValue::Number(cafe.id as f64));
    object.insert("name".to_string(), TemplateValue::String(cafe.name.clone()));
    object.insert(
        "map_url".to_string(),
        TemplateValue::String(cafe.map_url.clone()),
    );
    object.insert(
        "img_url".to_string(),
        TemplateValue::String(cafe.img_url.clone()),
    );
    object.insert(
        "location".to_string(),
        TemplateValue::String(cafe.location.clone()),
    );
    object.insert(
        "seats".to_string(),
        TemplateValue::String(cafe.seats.clone().unwrap_or_default()),
    );
    object.insert(
        "has_toilet".to_string(),
        TemplateValue::Bool(cafe.has_toilet),
    );
    object.insert("has_wifi".to_string(), TemplateValue::Bool(cafe.has_wifi));
    object.insert(
        "has_sockets".to_string(),
        TemplateValue::Bool(cafe.has_sockets),
    );
    object.insert(
        "can_take_calls".to_string(),
        TemplateValue::Bool(cafe.can_take_calls),
    );
    object.insert(
        "coffee_price".to_string(),
        TemplateValue::String(cafe.coffee_price.clone().unwrap_or_default()),
    );
    TemplateValue::Object(object)
}

/// Rebuilds the form page context after a failed validation: what the user
/// typed plus the per-field error messages.
fn form_context(
    input: &HashMap<String, String>,
    errors: &forms::ValidationErrors,
) -> HashMap<String, TemplateValue> {
    let mut values = HashMap::new();
    for field in ["name", "map_url", "img_url", "location", "seats", "coffee_price"] {
        values.insert(
            field.to_string(),
            TemplateValue::String(input.get(field).cloned().unwrap_or_default()),
        );
    }
    for field in ["has_toilet", "has_wifi", "has_sockets", "can_take_calls"] {
        values.insert(
            field.to_string(),
            TemplateValue::Bool(forms::checkbox_checked(input, field)),
        );
    }

    let error_map = errors
        .iter()
        .map(|(field, messages)| {
            (
                field.clone(),
                TemplateValue::List(
                    messages
                        .iter()
                        .cloned()
                        .map(TemplateValue::String)
                        .collect(),
                ),
            )
        })
        .collect();

    let mut context = HashMap::new();
    context.insert("values".to_string(), TemplateValue::Object(values));
    context.insert("errors".to_string(), TemplateValue::Object(error_map));
    context
}
