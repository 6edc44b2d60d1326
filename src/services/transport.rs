use reqwest::blocking::{multipart, Client};
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Could not build HTTP client.")]
    Client(#[source] reqwest::Error),

    #[error("Request to {url} failed.")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Encoded body of a prediction request.
#[derive(Clone, Debug, PartialEq)]
pub enum RequestBody {
    /// `application/x-www-form-urlencoded` fields.
    Form(Vec<(String, String)>),
    /// `multipart/form-data` text fields. Names may repeat.
    Multipart(Vec<(String, String)>),
    Json(serde_json::Value),
}

#[derive(Clone, Debug, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Something that can deliver a POST request and hand back the response.
pub trait Transport {
    fn post(&self, url: &str, body: &RequestBody) -> Result<HttpResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn post(&self, url: &str, body: &RequestBody) -> Result<HttpResponse, TransportError> {
        (**self).post(url, body)
    }
}

/// Blocking HTTP transport.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(user_agent: &str) -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(TransportError::Client)?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn post(&self, url: &str, body: &RequestBody) -> Result<HttpResponse, TransportError> {
        let request = self.client.post(url);
        let request = match body {
            RequestBody::Form(fields) => request.form(fields),
            RequestBody::Multipart(fields) => request.multipart(
                fields
                    .iter()
                    .fold(multipart::Form::new(), |form, (name, value)| {
                        form.text(name.clone(), value.clone())
                    }),
            ),
            RequestBody::Json(value) => request.json(value),
        };

        trace!(url, "Sending request.");
        let as_request_error = |source: reqwest::Error| TransportError::Request {
            url: url.to_string(),
            source,
        };
        let response = request.send().map_err(as_request_error)?;
        let status = response.status().as_u16();
        let body = response.text().map_err(as_request_error)?;
        Ok(HttpResponse { status, body })
    }
}
