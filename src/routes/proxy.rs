use std::sync::Arc;

use axum::{
    Form, Json, Router,
    extract::{FromRequest, Multipart, Query, Request, State},
    http::{Method, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::get,
};
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::Serialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    auth::signature,
    db::{
        entities::{list, list_item},
        list_repo::{self, NewListItem, UpsertOutcome},
    },
    error::AppError,
    shopify::{
        draft::{self, CartEntry, DraftOutcome, DraftRequest},
        files,
    },
    state::AppState,
};

#[derive(Debug, Serialize)]
pub struct ListSummary {
    pub id: Uuid,
    pub name: String,
    pub item_count: u64,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Debug, Serialize)]
pub struct ListDetail {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
    pub items: Vec<ItemResponse>,
}

#[derive(Debug, Serialize)]
pub struct ItemResponse {
    pub id: Uuid,
    pub sku: String,
    pub quantity: i32,
    pub created_at: DateTimeWithTimeZone,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/proxy", get(handle).post(handle).delete(handle))
        .with_state(state)
}

async fn handle(
    State(state): State<Arc<AppState>>,
    Query(query): Query<Vec<(String, String)>>,
    req: Request,
) -> Response {
    match dispatch(&state, query, req).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

/// Per-request pipeline: verify the signature over the query pairs, read
/// body parameters, check the action/method table, extract the customer
/// id, then run exactly one handler. No state survives the request.
async fn dispatch(
    state: &AppState,
    query: Vec<(String, String)>,
    req: Request,
) -> Result<Response, AppError> {
    signature::verify(&query, &state.cfg.proxy_shared_secret)?;

    let method = req.method().clone();
    let (body_pairs, attachment) = read_body(req).await?;
    let params = Params::new(query, body_pairs);

    let action = params
        .get("action")
        .ok_or_else(|| AppError::validation("Missing action"))?
        .to_string();
    ensure_method(&action, &method)?;
    let customer_id = parse_customer_id(&params)?;
    tracing::debug!(action = %action, customer_id, "dispatching proxy action");

    match action.as_str() {
        "list" => handle_list(state, customer_id).await,
        "get" => handle_get(state, customer_id, &params).await,
        "upsert" => handle_upsert(state, customer_id, &params).await,
        "delete" => handle_delete(state, customer_id, &params).await,
        "orderify" => handle_orderify(state, customer_id, &params).await,
        "draftpad" => handle_draftpad(state, customer_id, &params, attachment).await,
        _ => Err(AppError::validation("Unknown action")),
    }
}

async fn handle_list(state: &AppState, customer_id: i64) -> Result<Response, AppError> {
    let lists = list_repo::lists_for(&state.db, customer_id).await?;
    let lists: Vec<ListSummary> = lists.into_iter().map(ListSummary::from).collect();
    Ok(Json(json!({ "ok": true, "lists": lists })).into_response())
}

async fn handle_get(
    state: &AppState,
    customer_id: i64,
    params: &Params,
) -> Result<Response, AppError> {
    let list_id = require_list_id(params)?;
    let (model, items) = list_repo::get_list(&state.db, customer_id, list_id)
        .await?
        .ok_or_else(|| AppError::not_found("List not found"))?;
    Ok(Json(json!({ "ok": true, "list": ListDetail::from((model, items)) })).into_response())
}

async fn handle_upsert(
    state: &AppState,
    customer_id: i64,
    params: &Params,
) -> Result<Response, AppError> {
    let name = params
        .get("name")
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| AppError::validation("Name required"))?
        .to_string();

    let (items, dropped) = decode_items(params.get("items").unwrap_or(""));
    if items.is_empty() {
        return Err(AppError::validation("No valid items provided"));
    }
    if dropped > 0 {
        tracing::debug!(dropped, "dropped invalid list items");
    }

    // A stale or foreign list id falls back to insertion inside the repo;
    // an unparseable one is treated the same way.
    let list_id = params
        .get("list_id")
        .and_then(|raw| Uuid::parse_str(raw).ok());

    let (resolved_id, outcome) =
        list_repo::upsert_list(&state.db, customer_id, list_id, &name, &items).await?;
    Ok(Json(json!({
        "ok": true,
        "list_id": resolved_id,
        "created": outcome == UpsertOutcome::Created,
    }))
    .into_response())
}

async fn handle_delete(
    state: &AppState,
    customer_id: i64,
    params: &Params,
) -> Result<Response, AppError> {
    let list_id = require_list_id(params)?;
    let deleted = list_repo::delete_list(&state.db, customer_id, list_id).await?;
    if !deleted {
        return Err(AppError::not_found("List not found"));
    }
    Ok(Json(json!({ "ok": true })).into_response())
}

async fn handle_orderify(
    state: &AppState,
    customer_id: i64,
    params: &Params,
) -> Result<Response, AppError> {
    let list_id = require_list_id(params)?;
    let items = list_repo::items_for(&state.db, customer_id, list_id)
        .await?
        .ok_or_else(|| AppError::not_found("List not found"))?;
    let items: Vec<ItemResponse> = items.into_iter().map(ItemResponse::from).collect();
    Ok(Json(json!({ "ok": true, "items": items })).into_response())
}

async fn handle_draftpad(
    state: &AppState,
    customer_id: i64,
    params: &Params,
    attachment: Option<Attachment>,
) -> Result<Response, AppError> {
    let request = DraftRequest {
        customer_id,
        email: params.get_non_empty("email"),
        note: params.get_non_empty("note"),
        company: params.get_non_empty("company"),
        location: params.get_non_empty("location"),
        po_number: params.get_non_empty("po_number"),
        cart: decode_cart(params.get("cart").unwrap_or("")),
    };
    // Fail fast before the upload sequence or the draft call.
    draft::ensure_submittable(&request)?;

    let attachment_name = match attachment {
        Some(att) => {
            let filename = att.filename.clone();
            files::upload_attachment(&state.shopify, &att.filename, &att.content_type, att.bytes)
                .await?;
            Some(filename)
        }
        None => None,
    };

    match draft::create_draft_order(&state.shopify, &request, attachment_name.as_deref()).await? {
        DraftOutcome::Created { id, name } => Ok(Json(json!({
            "ok": true,
            "draft_order_id": id,
            "draft_order_name": name,
        }))
        .into_response()),
        // The platform's structured validation verdict is a business
        // rejection: the storefront parses it from the body, not the status.
        DraftOutcome::Rejected(message) => {
            Ok(Json(json!({ "ok": false, "error": message })).into_response())
        }
    }
}

/// Merged request parameters; query pairs precede body pairs, so the query
/// wins on key collision.
struct Params {
    pairs: Vec<(String, String)>,
}

impl Params {
    fn new(query: Vec<(String, String)>, body: Vec<(String, String)>) -> Self {
        let mut pairs = query;
        pairs.extend(body);
        Self { pairs }
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    fn get_non_empty(&self, key: &str) -> Option<String> {
        self.get(key)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }
}

struct Attachment {
    filename: String,
    content_type: String,
    bytes: Vec<u8>,
}

async fn read_body(req: Request) -> Result<(Vec<(String, String)>, Option<Attachment>), AppError> {
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_string();

    if content_type.starts_with("application/x-www-form-urlencoded") {
        let Form(pairs) = Form::<Vec<(String, String)>>::from_request(req, &())
            .await
            .map_err(|_| AppError::validation("Malformed form body"))?;
        return Ok((pairs, None));
    }

    if content_type.starts_with("multipart/form-data") {
        let mut multipart = Multipart::from_request(req, &())
            .await
            .map_err(|_| AppError::validation("Malformed multipart body"))?;
        let mut pairs = Vec::new();
        let mut attachment = None;
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|_| AppError::validation("Malformed multipart body"))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if let Some(filename) = field.file_name() {
                let filename = filename.to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|_| AppError::validation("Malformed multipart body"))?;
                attachment = Some(Attachment {
                    filename,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|_| AppError::validation("Malformed multipart body"))?;
                pairs.push((name, value));
            }
        }
        return Ok((pairs, attachment));
    }

    Ok((Vec::new(), None))
}

/// Fixed action table. Unknown actions and disallowed methods are rejected
/// before any store or platform access.
fn ensure_method(action: &str, method: &Method) -> Result<(), AppError> {
    let allowed: &[&str] = match action {
        "list" | "get" => &["GET"],
        "upsert" | "draftpad" => &["POST"],
        "delete" => &["POST", "DELETE"],
        "orderify" => &["GET", "POST"],
        _ => return Err(AppError::validation("Unknown action")),
    };
    if !allowed.contains(&method.as_str()) {
        return Err(AppError::validation("Method not allowed for action"));
    }
    Ok(())
}

/// Absent and malformed customer ids are rejected uniformly.
fn parse_customer_id(params: &Params) -> Result<i64, AppError> {
    params
        .get("customer_id")
        .filter(|raw| !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|raw| raw.parse::<i64>().ok())
        .ok_or_else(|| AppError::validation("Missing customer id"))
}

fn require_list_id(params: &Params) -> Result<Uuid, AppError> {
    let raw = params
        .get("list_id")
        .ok_or_else(|| AppError::validation("Missing list id"))?;
    Uuid::parse_str(raw).map_err(|_| AppError::validation("Invalid list id"))
}

/// Best-effort decode of the storefront's `items` JSON. Entries that fail
/// validation are dropped, not rejected individually; malformed JSON
/// yields an empty set rather than an error. Returns the surviving items
/// and the number dropped.
pub fn decode_items(raw: &str) -> (Vec<NewListItem>, usize) {
    let Ok(Value::Array(entries)) = serde_json::from_str::<Value>(raw) else {
        return (Vec::new(), 0);
    };
    let mut valid = Vec::new();
    let mut dropped = 0;
    for entry in &entries {
        match decode_item(entry) {
            Some(item) => valid.push(item),
            None => dropped += 1,
        }
    }
    (valid, dropped)
}

fn decode_item(entry: &Value) -> Option<NewListItem> {
    let sku = entry.get("sku")?.as_str()?.trim();
    if sku.is_empty() {
        return None;
    }
    let quantity = match entry.get("quantity") {
        None | Some(Value::Null) => 1,
        Some(value) => parse_quantity(value)?,
    };
    Some(NewListItem {
        sku: sku.to_string(),
        quantity,
    })
}

fn parse_quantity(value: &Value) -> Option<i32> {
    let quantity = match value {
        Value::Number(number) => number.as_i64()?,
        Value::String(raw) => raw.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    if quantity <= 0 {
        return None;
    }
    i32::try_from(quantity).ok()
}

/// Best-effort decode of the draftpad cart JSON; same policy as
/// `decode_items`.
fn decode_cart(raw: &str) -> Vec<CartEntry> {
    let Ok(Value::Array(entries)) = serde_json::from_str::<Value>(raw) else {
        return Vec::new();
    };
    entries.iter().filter_map(decode_cart_entry).collect()
}

fn decode_cart_entry(entry: &Value) -> Option<CartEntry> {
    let variant_id = match entry.get("variant_id") {
        None | Some(Value::Null) => None,
        Some(Value::Number(number)) => Some(number.as_i64()?),
        Some(Value::String(raw)) => Some(raw.trim().parse::<i64>().ok()?),
        Some(_) => return None,
    };
    let sku = entry
        .get("sku")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let title = entry
        .get("title")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    if variant_id.is_none() && sku.is_none() && title.is_none() {
        return None;
    }
    let quantity = match entry.get("quantity") {
        None | Some(Value::Null) => 1,
        Some(value) => parse_quantity(value)?,
    };
    Some(CartEntry {
        variant_id,
        sku,
        title,
        quantity: quantity as u32,
    })
}

impl From<(list::Model, u64)> for ListSummary {
    fn from((model, item_count): (list::Model, u64)) -> Self {
        Self {
            id: model.id,
            name: model.name,
            item_count,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

impl From<(list::Model, Vec<list_item::Model>)> for ListDetail {
    fn from((model, items): (list::Model, Vec<list_item::Model>)) -> Self {
        Self {
            id: model.id,
            name: model.name,
            created_at: model.created_at,
            updated_at: model.updated_at,
            items: items.into_iter().map(ItemResponse::from).collect(),
        }
    }
}

impl From<list_item::Model> for ItemResponse {
    fn from(model: list_item::Model) -> Self {
        Self {
            id: model.id,
            sku: model.sku,
            quantity: model.quantity,
            created_at: model.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Method;

    use super::{Params, decode_cart, decode_items, ensure_method, parse_customer_id};
    use crate::db::list_repo::NewListItem;

    fn params(entries: &[(&str, &str)]) -> Params {
        Params::new(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            Vec::new(),
        )
    }

    #[test]
    fn keeps_only_syntactically_valid_items() {
        let raw = r#"[
            {"sku":"A","quantity":2},
            {"sku":"","quantity":1},
            {"sku":"B","quantity":-1},
            {"sku":"C","quantity":"x"}
        ]"#;
        let (items, dropped) = decode_items(raw);
        assert_eq!(
            items,
            vec![NewListItem {
                sku: "A".to_string(),
                quantity: 2
            }]
        );
        assert_eq!(dropped, 3);
    }

    #[test]
    fn quantity_defaults_to_one_and_accepts_numeric_strings() {
        let (items, dropped) = decode_items(r#"[{"sku":"A"},{"sku":"B","quantity":"4"}]"#);
        assert_eq!(dropped, 0);
        assert_eq!(items[0].quantity, 1);
        assert_eq!(items[1].quantity, 4);
    }

    #[test]
    fn malformed_items_json_yields_an_empty_set() {
        let (items, dropped) = decode_items("not json at all");
        assert!(items.is_empty());
        assert_eq!(dropped, 0);

        let (items, _) = decode_items(r#"{"sku":"A"}"#);
        assert!(items.is_empty());
    }

    #[test]
    fn fractional_quantities_are_dropped() {
        let (items, dropped) = decode_items(r#"[{"sku":"A","quantity":2.5}]"#);
        assert!(items.is_empty());
        assert_eq!(dropped, 1);
    }

    #[test]
    fn cart_entries_need_a_variant_or_display_field() {
        let cart = decode_cart(r#"[{"variant_id":7,"quantity":2},{"quantity":3},{"title":"Widget"}]"#);
        assert_eq!(cart.len(), 2);
        assert_eq!(cart[0].variant_id, Some(7));
        assert_eq!(cart[0].quantity, 2);
        assert_eq!(cart[1].title.as_deref(), Some("Widget"));
        assert_eq!(cart[1].quantity, 1);
    }

    #[test]
    fn action_table_rejects_unknown_actions_and_wrong_methods() {
        assert!(ensure_method("list", &Method::GET).is_ok());
        assert!(ensure_method("list", &Method::POST).is_err());
        assert!(ensure_method("upsert", &Method::POST).is_ok());
        assert!(ensure_method("upsert", &Method::GET).is_err());
        assert!(ensure_method("delete", &Method::DELETE).is_ok());
        assert!(ensure_method("orderify", &Method::GET).is_ok());
        assert!(ensure_method("draftpad", &Method::POST).is_ok());
        assert!(ensure_method("nuke", &Method::POST).is_err());
    }

    #[test]
    fn customer_id_must_be_decimal_digits() {
        assert_eq!(
            parse_customer_id(&params(&[("customer_id", "42")])).unwrap(),
            42
        );
        assert!(parse_customer_id(&params(&[("customer_id", "")])).is_err());
        assert!(parse_customer_id(&params(&[("customer_id", "42x")])).is_err());
        assert!(parse_customer_id(&params(&[("customer_id", "-7")])).is_err());
        assert!(parse_customer_id(&params(&[])).is_err());
    }

    #[test]
    fn query_params_win_over_body_params() {
        let merged = Params::new(
            vec![("action".to_string(), "get".to_string())],
            vec![("action".to_string(), "delete".to_string())],
        );
        assert_eq!(merged.get("action"), Some("get"));
    }
}
