//! Alert headers that tell the UI what happened to an entity.

use axum::http::header::InvalidHeaderName;
use axum::http::{HeaderMap, HeaderName, HeaderValue};

/// Builds the `X-<app>-alert`, `X-<app>-error` and `X-<app>-params` headers.
#[derive(Debug, Clone)]
pub struct AlertHeaders {
    application_name: String,
    alert: HeaderName,
    error: HeaderName,
    params: HeaderName,
}

impl AlertHeaders {
    pub fn new(application_name: &str) -> Result<Self, InvalidHeaderName> {
        let name = |suffix: &str| {
            HeaderName::from_bytes(format!("x-{}-{}", application_name, suffix).as_bytes())
        };
        Ok(Self {
            application_name: application_name.to_string(),
            alert: name("alert")?,
            error: name("error")?,
            params: name("params")?,
        })
    }

    pub fn entity_created(&self, entity: &str, param: &str) -> HeaderMap {
        self.alert(&format!("{}.{}.created", self.application_name, entity), param)
    }

    pub fn entity_updated(&self, entity: &str, param: &str) -> HeaderMap {
        self.alert(&format!("{}.{}.updated", self.application_name, entity), param)
    }

    pub fn entity_deleted(&self, entity: &str, param: &str) -> HeaderMap {
        self.alert(&format!("{}.{}.deleted", self.application_name, entity), param)
    }

    pub fn failure(&self, entity: &str, error_key: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        insert(&mut headers, &self.error, &format!("error.{}", error_key));
        insert(&mut headers, &self.params, entity);
        headers
    }

    fn alert(&self, message: &str, param: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        insert(&mut headers, &self.alert, message);
        insert(&mut headers, &self.params, param);
        headers
    }
}

fn insert(headers: &mut HeaderMap, name: &HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name.clone(), value);
    }
}
