// Chrome DevTools Protocol client for a single page target

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::{BrowserError, BrowserResult, Target};
use crate::core::session::StoredCookie;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
const LOAD_TIMEOUT: Duration = Duration::from_secs(30);
const LOAD_POLL: Duration = Duration::from_millis(250);

/// Clickable elements searched when clicking by label
const CLICKABLE: &str =
    "button, a, input[type=submit], input[type=button], [role=button], [role=link], div[data-value]";

/// CDP target information from the `/json` endpoint
#[derive(Debug, Deserialize)]
pub struct CdpTarget {
    #[serde(rename = "webSocketDebuggerUrl")]
    pub ws_url: Option<String>,
    #[serde(rename = "type")]
    pub target_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct CdpRequest<'a> {
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct CdpResponse {
    id: Option<u64>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<CdpError>,
}

#[derive(Debug, Deserialize)]
struct CdpError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct CookieResult {
    cookies: Vec<CdpCookie>,
}

/// Cookie as returned by `Storage.getCookies`
#[derive(Debug, Deserialize, Clone)]
pub struct CdpCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    /// Unix timestamp as float, -1 for session cookies
    pub expires: f64,
    pub secure: bool,
    #[serde(rename = "httpOnly")]
    pub http_only: bool,
}

impl From<CdpCookie> for StoredCookie {
    fn from(cdp: CdpCookie) -> Self {
        StoredCookie {
            name: cdp.name,
            value: cdp.value,
            domain: cdp.domain,
            path: cdp.path,
            expires: (cdp.expires > 0.0).then(|| cdp.expires as i64),
            secure: cdp.secure,
            http_only: cdp.http_only,
        }
    }
}

/// Pick the websocket URL of the first page target
pub fn page_ws_url(targets: Vec<CdpTarget>) -> Option<String> {
    targets
        .into_iter()
        .find(|t| t.ws_url.is_some() && t.target_type.as_deref() == Some("page"))
        .and_then(|t| t.ws_url)
}

/// Connection to one page target
pub struct CdpPage {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    next_id: u64,
}

impl CdpPage {
    pub async fn connect(ws_url: &str) -> BrowserResult<Self> {
        let (ws, _) = connect_async(ws_url)
            .await
            .map_err(|e| BrowserError::Protocol(format!("cannot connect to {}: {}", ws_url, e)))?;
        Ok(Self { ws, next_id: 1 })
    }

    /// Send a command and wait for the response with the same id.
    ///
    /// Events arriving in between are ignored.
    pub async fn call(&mut self, method: &str, params: Value) -> BrowserResult<Value> {
        let id = self.next_id;
        self.next_id += 1;

        let request = serde_json::to_string(&CdpRequest { id, method, params })
            .map_err(|e| BrowserError::Protocol(e.to_string()))?;
        self.ws
            .send(Message::Text(request.into()))
            .await
            .map_err(|_| BrowserError::Closed)?;

        let response = tokio::time::timeout(COMMAND_TIMEOUT, async {
            while let Some(msg) = self.ws.next().await {
                let Ok(Message::Text(text)) = msg else {
                    continue;
                };
                let Ok(response) = serde_json::from_str::<CdpResponse>(&text) else {
                    continue;
                };
                if response.id == Some(id) {
                    return Ok(response);
                }
            }
            Err(BrowserError::Closed)
        })
        .await
        .map_err(|_| BrowserError::Protocol(format!("{} timed out", method)))??;

        if let Some(error) = response.error {
            return Err(BrowserError::Protocol(format!("{}: {}", method, error.message)));
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    /// Evaluate an expression in the page and return its JSON value
    pub async fn evaluate(&mut self, expression: &str) -> BrowserResult<Value> {
        let result = self
            .call(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;

        if let Some(details) = result.get("exceptionDetails") {
            let text = details
                .pointer("/exception/description")
                .or_else(|| details.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("script error");
            return Err(BrowserError::Protocol(text.to_string()));
        }

        Ok(result.pointer("/result/value").cloned().unwrap_or(Value::Null))
    }

    pub async fn navigate(&mut self, url: &str) -> BrowserResult<()> {
        let result = self.call("Page.navigate", json!({ "url": url })).await?;
        if let Some(error) = result.get("errorText").and_then(Value::as_str) {
            return Err(BrowserError::Protocol(format!("navigation to {} failed: {}", url, error)));
        }

        let start = tokio::time::Instant::now();
        while start.elapsed() < LOAD_TIMEOUT {
            // Evaluation fails while the old document is being replaced
            if let Ok(Value::String(state)) = self.evaluate("document.readyState").await {
                if state == "complete" {
                    return Ok(());
                }
            }
            tokio::time::sleep(LOAD_POLL).await;
        }

        log::warn!("Page {} still loading after {:?}", url, LOAD_TIMEOUT);
        Ok(())
    }

    pub async fn cookies(&mut self) -> BrowserResult<Vec<CdpCookie>> {
        let result = self.call("Storage.getCookies", json!({})).await?;
        let cookies: CookieResult =
            serde_json::from_value(result).map_err(|e| BrowserError::Protocol(e.to_string()))?;
        Ok(cookies.cookies)
    }

    pub async fn close(&mut self) {
        let _ = self.call("Browser.close", json!({})).await;
        let _ = self.ws.close(None).await;
    }
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// Set an input's value the way a user would, so page scripts see the change
pub fn fill_script(selector: &str, value: &str) -> String {
    format!(
        r#"(() => {{
  const el = document.querySelector({sel});
  if (!el) return false;
  el.focus();
  const proto = el instanceof HTMLTextAreaElement ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;
  Object.getOwnPropertyDescriptor(proto, 'value').set.call(el, {val});
  el.dispatchEvent(new Event('input', {{ bubbles: true }}));
  el.dispatchEvent(new Event('change', {{ bubbles: true }}));
  return true;
}})()"#,
        sel = js_string(selector),
        val = js_string(value),
    )
}

pub fn click_script(target: &Target) -> String {
    match target {
        Target::Css(selector) => format!(
            r#"(() => {{
  const el = document.querySelector({sel});
  if (!el) return false;
  el.click();
  return true;
}})()"#,
            sel = js_string(selector),
        ),
        Target::Text(label) => format!(
            r#"(() => {{
  const want = {label};
  const el = Array.from(document.querySelectorAll({clickable}))
    .find(e => ((e.innerText || e.value || '').trim()) === want);
  if (!el) return false;
  el.click();
  return true;
}})()"#,
            label = js_string(label),
            clickable = js_string(CLICKABLE),
        ),
    }
}

pub fn exists_script(selector: &str) -> String {
    format!("document.querySelector({}) !== null", js_string(selector))
}

pub fn texts_script(selector: &str) -> String {
    format!(
        "Array.from(document.querySelectorAll({})).map(e => (e.innerText || '').trim())",
        js_string(selector)
    )
}
