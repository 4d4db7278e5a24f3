use serde_json::{Value, json};

use super::{client::ShopifyClient, gid};
use crate::error::AppError;

const DRAFT_ORDER_CREATE: &str = r#"
mutation draftOrderCreate($input: DraftOrderInput!) {
  draftOrderCreate(input: $input) {
    draftOrder { id name }
    userErrors { field message }
  }
}"#;

/// One cart line as submitted by the storefront. Entries without a variant
/// id are sent as custom line items using their display fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartEntry {
    pub variant_id: Option<i64>,
    pub sku: Option<String>,
    pub title: Option<String>,
    pub quantity: u32,
}

impl CartEntry {
    /// Display label for the composed note: SKU when present, title
    /// otherwise, a fixed placeholder as a last resort.
    pub fn label(&self) -> &str {
        self.sku
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.title.as_deref().filter(|s| !s.is_empty()))
            .unwrap_or("(unnamed item)")
    }
}

#[derive(Debug, Clone, Default)]
pub struct DraftRequest {
    pub customer_id: i64,
    pub email: Option<String>,
    pub note: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub po_number: Option<String>,
    pub cart: Vec<CartEntry>,
}

/// Outcome of a completed round-trip. `Rejected` is the platform's own
/// structured validation verdict — a business rejection, not a transport
/// failure, and it travels back to the storefront as `ok: false` with
/// HTTP 200.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftOutcome {
    Created { id: String, name: String },
    Rejected(String),
}

/// A draft must carry something to order from: a free-text note, a cart,
/// or both. Checked before any outbound call.
pub fn ensure_submittable(request: &DraftRequest) -> Result<(), AppError> {
    let has_note = request
        .note
        .as_deref()
        .is_some_and(|note| !note.trim().is_empty());
    if !has_note && request.cart.is_empty() {
        return Err(AppError::validation("Note or items required"));
    }
    Ok(())
}

/// Deterministic note body: header block, itemized cart lines, then the
/// raw free-text note behind a separator.
pub fn compose_note(request: &DraftRequest, attachment_name: Option<&str>) -> String {
    let mut lines = vec![format!("Customer: {}", request.customer_id)];
    if let Some(email) = request.email.as_deref().filter(|s| !s.is_empty()) {
        lines.push(format!("Email: {email}"));
    }
    if let Some(company) = request.company.as_deref().filter(|s| !s.is_empty()) {
        lines.push(format!("Company: {company}"));
    }
    if let Some(location) = request.location.as_deref().filter(|s| !s.is_empty()) {
        lines.push(format!("Location: {location}"));
    }
    if let Some(po) = request.po_number.as_deref().filter(|s| !s.is_empty()) {
        lines.push(format!("PO number: {po}"));
    }
    if let Some(name) = attachment_name {
        lines.push(format!("Attachment: {name}"));
    }

    if !request.cart.is_empty() {
        lines.push(String::new());
        lines.push("Items:".to_string());
        for entry in &request.cart {
            lines.push(format!("{} x {}", entry.quantity, entry.label()));
        }
    }

    if let Some(note) = request.note.as_deref().filter(|s| !s.trim().is_empty()) {
        lines.push(String::new());
        lines.push("---".to_string());
        lines.push(note.to_string());
    }

    lines.join("\n")
}

/// Creates a draft order in the commerce platform. Exactly one outbound
/// call; `userErrors` from the mutation come back as
/// `DraftOutcome::Rejected` rather than an error.
pub async fn create_draft_order(
    client: &ShopifyClient,
    request: &DraftRequest,
    attachment_name: Option<&str>,
) -> Result<DraftOutcome, AppError> {
    ensure_submittable(request)?;

    let input = draft_order_input(request, attachment_name);
    let data = client
        .graphql(DRAFT_ORDER_CREATE, json!({ "input": input }))
        .await?;
    let payload = &data["draftOrderCreate"];

    if let Some(errors) = payload.get("userErrors").and_then(Value::as_array) {
        if !errors.is_empty() {
            return Ok(DraftOutcome::Rejected(join_user_errors(errors)));
        }
    }

    let draft = &payload["draftOrder"];
    match (draft["id"].as_str(), draft["name"].as_str()) {
        (Some(id), name) => Ok(DraftOutcome::Created {
            id: id.to_string(),
            name: name.unwrap_or_default().to_string(),
        }),
        (None, _) => Err(AppError::upstream("Draft order not created")),
    }
}

fn draft_order_input(request: &DraftRequest, attachment_name: Option<&str>) -> Value {
    let mut input = json!({
        "customerId": gid::customer_gid(request.customer_id),
        "note": compose_note(request, attachment_name),
    });
    if let Some(email) = request.email.as_deref().filter(|s| !s.is_empty()) {
        input["email"] = json!(email);
    }
    if !request.cart.is_empty() {
        let line_items: Vec<Value> = request
            .cart
            .iter()
            .map(|entry| match entry.variant_id {
                Some(variant_id) => json!({
                    "variantId": gid::variant_gid(variant_id),
                    "quantity": entry.quantity,
                }),
                None => json!({
                    "title": entry.label(),
                    "quantity": entry.quantity,
                }),
            })
            .collect();
        input["lineItems"] = json!(line_items);
    }
    input
}

/// Joins the platform's field/message pairs into one human-readable
/// string, surfaced verbatim to the storefront.
fn join_user_errors(errors: &[Value]) -> String {
    errors
        .iter()
        .map(|error| {
            let message = error["message"].as_str().unwrap_or("Unknown error");
            match error["field"].as_array().filter(|f| !f.is_empty()) {
                Some(field) => {
                    let path: Vec<&str> = field.iter().filter_map(Value::as_str).collect();
                    format!("{}: {}", path.join("."), message)
                }
                None => message.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{CartEntry, DraftRequest, compose_note, ensure_submittable, join_user_errors};

    fn cart_entry(sku: &str, quantity: u32) -> CartEntry {
        CartEntry {
            variant_id: None,
            sku: Some(sku.to_string()),
            title: None,
            quantity,
        }
    }

    #[test]
    fn rejects_empty_note_and_empty_cart() {
        let request = DraftRequest {
            customer_id: 42,
            note: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(ensure_submittable(&request).is_err());
    }

    #[test]
    fn accepts_cart_without_note() {
        let request = DraftRequest {
            customer_id: 42,
            cart: vec![cart_entry("SKU1", 1)],
            ..Default::default()
        };
        assert!(ensure_submittable(&request).is_ok());
    }

    #[test]
    fn composes_header_items_and_note_sections() {
        let request = DraftRequest {
            customer_id: 42,
            email: Some("buyer@example.com".to_string()),
            company: Some("Acme".to_string()),
            note: Some("Deliver to dock 3".to_string()),
            cart: vec![cart_entry("SKU1", 3), cart_entry("SKU2", 1)],
            ..Default::default()
        };

        let note = compose_note(&request, None);
        assert_eq!(
            note,
            "Customer: 42\n\
             Email: buyer@example.com\n\
             Company: Acme\n\
             \n\
             Items:\n\
             3 x SKU1\n\
             1 x SKU2\n\
             \n\
             ---\n\
             Deliver to dock 3"
        );
    }

    #[test]
    fn composition_is_deterministic() {
        let request = DraftRequest {
            customer_id: 7,
            note: Some("note".to_string()),
            cart: vec![cart_entry("A", 2)],
            ..Default::default()
        };
        assert_eq!(compose_note(&request, None), compose_note(&request, None));
    }

    #[test]
    fn falls_back_to_title_when_sku_is_empty() {
        let entry = CartEntry {
            variant_id: None,
            sku: Some(String::new()),
            title: Some("Blue Widget".to_string()),
            quantity: 1,
        };
        assert_eq!(entry.label(), "Blue Widget");
    }

    #[test]
    fn joins_user_errors_with_field_paths() {
        let errors = vec![
            json!({ "field": ["input", "email"], "message": "Email is invalid" }),
            json!({ "field": null, "message": "Customer not found" }),
        ];
        assert_eq!(
            join_user_errors(&errors),
            "input.email: Email is invalid; Customer not found"
        );
    }
}
