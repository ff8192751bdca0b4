use std::sync::Mutex;
use std::time::Duration;

use crate::transport::{NetworkError, PortalRequest, PortalResponse, Transport};

type Handler =
    dyn Fn(&PortalRequest, &[PortalRequest]) -> Result<PortalResponse, NetworkError> + Send + Sync;

/// Scripted in-memory portal. The handler sees each request together with
/// every request that was answered before it.
pub struct FakePortal {
    handler: Box<Handler>,
    delay: Box<dyn Fn(&PortalRequest) -> Duration + Send + Sync>,
    log: Mutex<Vec<PortalRequest>>,
}

impl FakePortal {
    pub fn new(
        handler: impl Fn(&PortalRequest, &[PortalRequest]) -> Result<PortalResponse, NetworkError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            delay: Box::new(|_| Duration::ZERO),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(
        mut self,
        delay: impl Fn(&PortalRequest) -> Duration + Send + Sync + 'static,
    ) -> Self {
        self.delay = Box::new(delay);
        self
    }

    pub fn requests(&self) -> Vec<PortalRequest> {
        self.log.lock().expect("request log poisoned").clone()
    }
}

impl Transport for FakePortal {
    async fn fetch(&self, request: &PortalRequest) -> Result<PortalResponse, NetworkError> {
        let delay = (self.delay)(request);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let history = self.requests();
        let result = (self.handler)(request, &history);
        self.log
            .lock()
            .expect("request log poisoned")
            .push(request.clone());
        result
    }
}

pub fn html_response(url: &str, body: &str) -> PortalResponse {
    PortalResponse {
        status: 200,
        url: url.to_string(),
        body: body.to_string(),
    }
}

pub fn home_page(token: Option<&str>) -> String {
    let input = token
        .map(|t| format!(r#"<input type="hidden" name="_token" value="{t}">"#))
        .unwrap_or_default();
    format!(
        r#"<html><body><form method="POST" action="/login">{input}
        <input name="emis_code"><input name="password" type="password"></form></body></html>"#
    )
}

pub fn detail_page(meta_token: Option<&str>) -> String {
    let meta = meta_token
        .map(|t| format!(r#"<meta name="csrf-token" content="{t}">"#))
        .unwrap_or_default();
    format!(r#"<html><head>{meta}</head><body><h4>Detail Report</h4></body></html>"#)
}

/// A detail-report card whose table body holds `rows`, each a list of cells.
pub fn section(title: &str, rows: &[&[&str]]) -> String {
    let body: String = rows
        .iter()
        .map(|cells| {
            let tds: String = cells.iter().map(|c| format!("<td> {c} </td>")).collect();
            format!("<tr>{tds}</tr>")
        })
        .collect();
    format!(
        r#"<div class="card"><div class="card-body">
            <h4 class="header-title mb-3">{title}</h4>
            <div class="table-responsive"><table class="table">
                <thead><tr><th>Sr#</th><th>Date</th><th>Received Quantity</th>
                <th>Present Stock</th><th>Consumption</th><th>Remaining Balance</th></tr></thead>
                <tbody>{body}</tbody>
            </table></div>
        </div></div>"#
    )
}
