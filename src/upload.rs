use log::debug;
use reqwest::{multipart::Form, Client};
use url::Url;

use crate::error::UploadError;

/// POSTs a multipart form and returns the response text.
pub async fn send_form(client: &Client, url: Url, form: Form) -> Result<String, UploadError> {
    debug!("uploading to {url}");
    let response = client.post(url).multipart(form).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(UploadError::Status {
            status,
            body: response.text().await.unwrap_or_default(),
        });
    }
    Ok(response.text().await?)
}
