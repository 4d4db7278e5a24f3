use reqwest::multipart;
use serde_json::{Value, json};

use super::client::ShopifyClient;
use crate::error::AppError;

const STAGED_UPLOADS_CREATE: &str = r#"
mutation stagedUploadsCreate($input: [StagedUploadInput!]!) {
  stagedUploadsCreate(input: $input) {
    stagedTargets {
      url
      resourceUrl
      parameters { name value }
    }
    userErrors { field message }
  }
}"#;

const FILE_CREATE: &str = r#"
mutation fileCreate($files: [FileCreateInput!]!) {
  fileCreate(files: $files) {
    files { id }
    userErrors { field message }
  }
}"#;

/// Uploads an attachment through the platform's three-step staged flow:
/// request an upload target, POST the bytes to it, then register the
/// uploaded resource. The first failing step aborts the rest.
pub async fn upload_attachment(
    client: &ShopifyClient,
    filename: &str,
    mime_type: &str,
    bytes: Vec<u8>,
) -> Result<String, AppError> {
    let target = create_staged_target(client, filename, mime_type).await?;
    post_to_target(client, &target, filename, mime_type, bytes).await?;
    register_file(client, &target.resource_url).await
}

struct StagedTarget {
    url: String,
    resource_url: String,
    parameters: Vec<(String, String)>,
}

async fn create_staged_target(
    client: &ShopifyClient,
    filename: &str,
    mime_type: &str,
) -> Result<StagedTarget, AppError> {
    let input = json!([{
        "filename": filename,
        "mimeType": mime_type,
        "resource": "FILE",
        "httpMethod": "POST",
    }]);
    let data = client
        .graphql(STAGED_UPLOADS_CREATE, json!({ "input": input }))
        .await?;
    let payload = &data["stagedUploadsCreate"];

    if has_user_errors(payload) {
        return Err(AppError::upstream("Upload target request rejected"));
    }

    let target = payload["stagedTargets"]
        .get(0)
        .ok_or_else(|| AppError::upstream("No upload target issued"))?;
    let url = target["url"]
        .as_str()
        .ok_or_else(|| AppError::upstream("Upload target missing URL"))?;
    let resource_url = target["resourceUrl"]
        .as_str()
        .ok_or_else(|| AppError::upstream("Upload target missing resource URL"))?;
    let parameters = target["parameters"]
        .as_array()
        .map(|params| {
            params
                .iter()
                .filter_map(|param| {
                    Some((
                        param["name"].as_str()?.to_string(),
                        param["value"].as_str()?.to_string(),
                    ))
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(StagedTarget {
        url: url.to_string(),
        resource_url: resource_url.to_string(),
        parameters,
    })
}

async fn post_to_target(
    client: &ShopifyClient,
    target: &StagedTarget,
    filename: &str,
    mime_type: &str,
    bytes: Vec<u8>,
) -> Result<(), AppError> {
    // Platform-issued parameters must precede the file part.
    let mut form = multipart::Form::new();
    for (name, value) in &target.parameters {
        form = form.text(name.clone(), value.clone());
    }
    let part = multipart::Part::bytes(bytes)
        .file_name(filename.to_string())
        .mime_str(mime_type)
        .map_err(|_| AppError::validation("Invalid attachment content type"))?;
    form = form.part("file", part);

    let response = client
        .http()
        .post(&target.url)
        .multipart(form)
        .send()
        .await
        .map_err(|err| {
            tracing::error!("staged upload failed: {err}");
            AppError::upstream("Attachment upload failed")
        })?;

    if !response.status().is_success() {
        tracing::error!("staged upload returned status {}", response.status());
        return Err(AppError::upstream("Attachment upload failed"));
    }
    Ok(())
}

async fn register_file(client: &ShopifyClient, resource_url: &str) -> Result<String, AppError> {
    let files = json!([{ "originalSource": resource_url }]);
    let data = client.graphql(FILE_CREATE, json!({ "files": files })).await?;
    let payload = &data["fileCreate"];

    if has_user_errors(payload) {
        return Err(AppError::upstream("Attachment registration rejected"));
    }

    payload["files"]
        .get(0)
        .and_then(|file| file["id"].as_str())
        .map(str::to_string)
        .ok_or_else(|| AppError::upstream("Attachment not registered"))
}

fn has_user_errors(payload: &Value) -> bool {
    payload
        .get("userErrors")
        .and_then(Value::as_array)
        .is_some_and(|errors| !errors.is_empty())
}
