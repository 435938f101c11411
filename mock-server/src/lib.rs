//! In-memory stand-in for the Etsy API v2.
//!
//! Serves the method table at `GET /v2/`, a handful of shop and listing
//! methods wrapped in the `{"count", "results", "params", "type"}` envelope,
//! and the OAuth1.0 token endpoints. Errors are plain-text bodies, as on the
//! real service.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

/// The only API key the server accepts.
pub const API_KEY: &str = "mock-api-key";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub file_name: String,
    pub content_type: String,
    pub size: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub listing_id: u64,
    pub title: String,
    pub description: String,
    pub quantity: i64,
    pub price: f64,
    pub who_made: String,
    pub is_supply: bool,
    pub image: Option<Image>,
}

#[derive(Debug)]
struct PendingToken {
    callback: String,
    verifier: Option<String>,
}

#[derive(Debug, Default)]
pub struct Store {
    listings: BTreeMap<u64, Listing>,
    next_id: u64,
    pending: HashMap<String, PendingToken>,
}

pub type Db = Arc<RwLock<Store>>;

type Reply<T = Json<Value>> = Result<T, (StatusCode, String)>;

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Store::default()));
    Router::new()
        .route("/v2/", get(method_table))
        .route("/v2/server/ping", get(ping))
        .route("/v2/shops/{*shop_id}", get(get_shop))
        .route("/v2/listings", post(create_listing))
        .route("/v2/listings/active", get(find_all_listing_active))
        .route(
            "/v2/listings/{listing_id}",
            get(get_listing).put(update_listing).delete(delete_listing),
        )
        .route("/v2/oauth/request_token", post(request_token))
        .route("/v2/oauth/authorize", get(authorize_token))
        .route("/v2/oauth/access_token", post(access_token))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Entries served at `GET /v2/`.
pub fn methods() -> Vec<Value> {
    let method = |name: &str,
                  uri: &str,
                  http_method: &str,
                  params: Value,
                  result_type: &str,
                  description: &str| {
        json!({
            "name": name,
            "uri": uri,
            "http_method": http_method,
            "params": params,
            "defaults": null,
            "visibility": "public",
            "type": result_type,
            "description": description,
        })
    };
    vec![
        method(
            "ping",
            "/server/ping",
            "GET",
            Value::Null,
            "string",
            "Check that the server is alive.",
        ),
        method(
            "getShop",
            "/shops/:shop_id",
            "GET",
            json!({"shop_id": "shop_id_or_name"}),
            "Shop",
            "Retrieves a Shop by id or name.",
        ),
        method(
            "findAllListingActive",
            "/listings/active",
            "GET",
            json!({"limit": "int", "offset": "int", "keywords": "text"}),
            "Listing",
            "Finds all active Listings.",
        ),
        method(
            "getListing",
            "/listings/:listing_id",
            "GET",
            json!({"listing_id": "int"}),
            "Listing",
            "Retrieves a Listing by id.",
        ),
        method(
            "createListing",
            "/listings",
            "POST",
            json!({
                "title": "string",
                "description": "text",
                "quantity": "int",
                "price": "float",
                "who_made": "enum(i_did, collective, someone_else)",
                "is_supply": "boolean",
                "image": "image",
            }),
            "Listing",
            "Creates a new Listing.",
        ),
        method(
            "updateListing",
            "/listings/:listing_id",
            "PUT",
            json!({"listing_id": "int", "title": "string", "quantity": "int", "price": "float"}),
            "Listing",
            "Updates a Listing.",
        ),
        method(
            "deleteListing",
            "/listings/:listing_id",
            "DELETE",
            json!({"listing_id": "int"}),
            "Listing",
            "Deletes a Listing.",
        ),
    ]
}

fn envelope(results: Vec<Value>, count: usize, params: Value, result_type: &str) -> Json<Value> {
    Json(json!({
        "count": count,
        "results": results,
        "params": params,
        "type": result_type,
    }))
}

fn bad_request(message: impl ToString) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, message.to_string())
}

fn not_found(what: &str) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, format!("{what} not found"))
}

/// A request passes with the mock API key or with OAuth parameters.
fn authorize(headers: &HeaderMap, api_key: Option<&String>) -> Reply<()> {
    if oauth_params(headers).is_some() || api_key.is_some_and(|k| k == API_KEY) {
        Ok(())
    } else {
        Err((
            StatusCode::FORBIDDEN,
            "API request must include a valid api_key or OAuth parameters".to_string(),
        ))
    }
}

/// Parameters of an `Authorization: OAuth k="v", ...` header.
fn oauth_params(headers: &HeaderMap) -> Option<HashMap<String, String>> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let params = value.strip_prefix("OAuth ")?;
    Some(
        params
            .split(',')
            .filter_map(|pair| pair.trim().split_once('='))
            .map(|(k, v)| (k.to_string(), v.trim_matches('"').to_string()))
            .collect(),
    )
}

#[derive(Debug, Default)]
struct FormData {
    fields: HashMap<String, String>,
    files: HashMap<String, Image>,
}

async fn read_form(mut multipart: Multipart) -> Reply<FormData> {
    let mut form = FormData::default();
    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field.bytes().await.map_err(bad_request)?;
                form.files.insert(
                    name,
                    Image {
                        file_name,
                        content_type,
                        size: data.len(),
                    },
                );
            }
            None => {
                let text = field.text().await.map_err(bad_request)?;
                form.fields.insert(name, text);
            }
        }
    }
    Ok(form)
}

fn parse_field<T: std::str::FromStr>(form: &FormData, name: &str) -> Reply<Option<T>> {
    form.fields
        .get(name)
        .map(|raw| {
            raw.parse()
                .map_err(|_| bad_request(format!("Invalid value for param '{name}': {raw}")))
        })
        .transpose()
}

fn required<T>(value: Option<T>, name: &str) -> Reply<T> {
    value.ok_or_else(|| bad_request(format!("Missing required param '{name}'")))
}

fn listing_json(listing: &Listing) -> Value {
    serde_json::to_value(listing).unwrap_or(Value::Null)
}

async fn method_table(headers: HeaderMap, Query(query): Query<HashMap<String, String>>) -> Reply {
    authorize(&headers, query.get("api_key"))?;
    let methods = methods();
    let count = methods.len();
    Ok(envelope(methods, count, Value::Null, "ApiMethod"))
}

async fn ping(headers: HeaderMap, Query(query): Query<HashMap<String, String>>) -> Reply {
    authorize(&headers, query.get("api_key"))?;
    Ok(envelope(vec![json!("pong")], 1, Value::Null, "string"))
}

async fn get_shop(
    headers: HeaderMap,
    Path(shop_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Reply {
    authorize(&headers, query.get("api_key"))?;
    let shop = match shop_id.parse::<u64>() {
        Ok(id) => json!({"shop_id": id, "shop_name": format!("shop{id}")}),
        Err(_) => json!({"shop_id": 1, "shop_name": shop_id}),
    };
    Ok(envelope(vec![shop], 1, json!({"shop_id": shop_id}), "Shop"))
}

async fn find_all_listing_active(
    State(db): State<Db>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Reply {
    authorize(&headers, query.get("api_key"))?;
    let number = |name: &str, default: usize| -> Reply<usize> {
        query
            .get(name)
            .map(|v| {
                v.parse()
                    .map_err(|_| bad_request(format!("Invalid value for param '{name}': {v}")))
            })
            .transpose()
            .map(|v| v.unwrap_or(default))
    };
    let limit = number("limit", 25)?;
    let offset = number("offset", 0)?;
    let keywords = query.get("keywords").map(|k| k.to_lowercase());

    let store = db.read().await;
    let matching: Vec<&Listing> = store
        .listings
        .values()
        .filter(|l| keywords.as_ref().map_or(true, |k| l.title.to_lowercase().contains(k)))
        .collect();
    let page = matching.iter().skip(offset).take(limit).map(|l| listing_json(l)).collect();
    Ok(envelope(
        page,
        matching.len(),
        json!({"limit": limit, "offset": offset}),
        "Listing",
    ))
}

async fn get_listing(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(listing_id): Path<u64>,
    Query(query): Query<HashMap<String, String>>,
) -> Reply {
    authorize(&headers, query.get("api_key"))?;
    let store = db.read().await;
    let listing = store.listings.get(&listing_id).ok_or_else(|| not_found("Listing"))?;
    Ok(envelope(vec![listing_json(listing)], 1, json!({"listing_id": listing_id}), "Listing"))
}

async fn create_listing(
    State(db): State<Db>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Reply<(StatusCode, Json<Value>)> {
    let form = read_form(multipart).await?;
    authorize(&headers, form.fields.get("api_key"))?;

    let title = required(form.fields.get("title").cloned(), "title")?;
    let quantity = required(parse_field(&form, "quantity")?, "quantity")?;
    let price = required(parse_field(&form, "price")?, "price")?;
    let is_supply = parse_field(&form, "is_supply")?.unwrap_or(false);

    let mut store = db.write().await;
    store.next_id += 1;
    let listing = Listing {
        listing_id: store.next_id,
        title,
        description: form.fields.get("description").cloned().unwrap_or_default(),
        quantity,
        price,
        who_made: form.fields.get("who_made").cloned().unwrap_or_default(),
        is_supply,
        image: form.files.get("image").cloned(),
    };
    store.listings.insert(listing.listing_id, listing.clone());
    Ok((
        StatusCode::CREATED,
        envelope(vec![listing_json(&listing)], 1, Value::Null, "Listing"),
    ))
}

async fn update_listing(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(listing_id): Path<u64>,
    multipart: Multipart,
) -> Reply {
    let form = read_form(multipart).await?;
    authorize(&headers, form.fields.get("api_key"))?;

    let mut store = db.write().await;
    let listing = store.listings.get_mut(&listing_id).ok_or_else(|| not_found("Listing"))?;
    if let Some(title) = form.fields.get("title") {
        listing.title = title.clone();
    }
    if let Some(quantity) = parse_field(&form, "quantity")? {
        listing.quantity = quantity;
    }
    if let Some(price) = parse_field(&form, "price")? {
        listing.price = price;
    }
    Ok(envelope(vec![listing_json(listing)], 1, json!({"listing_id": listing_id}), "Listing"))
}

async fn delete_listing(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(listing_id): Path<u64>,
    Query(query): Query<HashMap<String, String>>,
) -> Reply {
    authorize(&headers, query.get("api_key"))?;
    db.write()
        .await
        .listings
        .remove(&listing_id)
        .ok_or_else(|| not_found("Listing"))?;
    Ok(envelope(Vec::new(), 0, json!({"listing_id": listing_id}), "Listing"))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RequestTokenResponse {
    pub login_url: String,
    pub oauth_token: String,
    pub oauth_token_secret: String,
    pub oauth_callback_confirmed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccessTokenResponse {
    pub oauth_token: String,
    pub oauth_token_secret: String,
}

fn oauth_problem(problem: &str) -> (StatusCode, String) {
    (StatusCode::UNAUTHORIZED, format!("oauth_problem={problem}"))
}

async fn request_token(
    State(db): State<Db>,
    headers: HeaderMap,
) -> Reply<Form<RequestTokenResponse>> {
    let params = oauth_params(&headers).ok_or_else(|| oauth_problem("parameter_absent"))?;
    if !params.contains_key("oauth_consumer_key") {
        return Err(oauth_problem("consumer_key_unknown"));
    }
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");

    let token = Uuid::new_v4().simple().to_string();
    let secret = Uuid::new_v4().simple().to_string();
    let callback = params.get("oauth_callback").cloned().unwrap_or_else(|| "oob".to_string());
    db.write().await.pending.insert(
        token.clone(),
        PendingToken {
            callback,
            verifier: None,
        },
    );
    Ok(Form(RequestTokenResponse {
        login_url: format!("http://{host}/v2/oauth/authorize?oauth_token={token}"),
        oauth_token: token,
        oauth_token_secret: secret,
        oauth_callback_confirmed: true,
    }))
}

/// Stands in for the user granting access: answers with the URL the
/// provider would redirect to.
async fn authorize_token(
    State(db): State<Db>,
    Query(query): Query<HashMap<String, String>>,
) -> Reply<String> {
    let token = query.get("oauth_token").ok_or_else(|| oauth_problem("parameter_absent"))?;
    let mut store = db.write().await;
    let pending = store.pending.get_mut(token).ok_or_else(|| oauth_problem("token_rejected"))?;
    let verifier = Uuid::new_v4().simple().to_string();
    pending.verifier = Some(verifier.clone());
    Ok(format!(
        "{}?oauth_token={token}&oauth_verifier={verifier}",
        pending.callback
    ))
}

async fn access_token(
    State(db): State<Db>,
    headers: HeaderMap,
) -> Reply<Form<AccessTokenResponse>> {
    let params = oauth_params(&headers).ok_or_else(|| oauth_problem("parameter_absent"))?;
    let (Some(token), Some(verifier)) = (params.get("oauth_token"), params.get("oauth_verifier"))
    else {
        return Err(oauth_problem("parameter_absent"));
    };

    let mut store = db.write().await;
    let pending = store.pending.get(token).ok_or_else(|| oauth_problem("token_rejected"))?;
    if pending.verifier.as_ref() != Some(verifier) {
        return Err(oauth_problem("verifier_invalid"));
    }
    store.pending.remove(token);
    Ok(Form(AccessTokenResponse {
        oauth_token: Uuid::new_v4().simple().to_string(),
        oauth_token_secret: Uuid::new_v4().simple().to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_table_entries_have_server_shape() {
        let methods = methods();
        assert_eq!(methods.len(), 7);
        for m in &methods {
            assert!(m["name"].is_string());
            assert!(m["uri"].as_str().unwrap().starts_with('/'));
            assert!(["GET", "POST", "PUT", "DELETE"].contains(&m["http_method"].as_str().unwrap()));
        }
        let create = methods.iter().find(|m| m["name"] == "createListing").unwrap();
        assert_eq!(create["params"]["image"], "image");
    }

    #[test]
    fn method_names_are_unique() {
        let methods = methods();
        let mut names: Vec<&str> = methods.iter().map(|m| m["name"].as_str().unwrap()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), methods.len());
    }

    #[test]
    fn oauth_header_is_parsed() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            r#"OAuth oauth_consumer_key="key", oauth_token="t1", oauth_verifier="v1""#
                .parse()
                .unwrap(),
        );
        let params = oauth_params(&headers).unwrap();
        assert_eq!(params["oauth_consumer_key"], "key");
        assert_eq!(params["oauth_token"], "t1");
        assert_eq!(params["oauth_verifier"], "v1");
    }

    #[test]
    fn authorize_needs_key_or_oauth() {
        let headers = HeaderMap::new();
        assert!(authorize(&headers, Some(&API_KEY.to_string())).is_ok());
        assert_eq!(
            authorize(&headers, Some(&"wrong".to_string())).unwrap_err().0,
            StatusCode::FORBIDDEN
        );
        assert!(authorize(&headers, None).is_err());
    }

    #[test]
    fn listing_serializes_to_json() {
        let listing = Listing {
            listing_id: 7,
            title: "Mug".to_string(),
            description: String::new(),
            quantity: 2,
            price: 12.5,
            who_made: "i_did".to_string(),
            is_supply: false,
            image: None,
        };
        let json = listing_json(&listing);
        assert_eq!(json["listing_id"], 7);
        assert_eq!(json["price"], 12.5);
        assert_eq!(json["image"], Value::Null);
    }
}
