//! Cliente HTTP del servicio de chat remoto (`/chat`, `/reset`,
//! `/related-files`).

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};
use url::Url;

use crate::config::EndpointConfig;

/// Mensaje fijo que acompaña a cada lote del proyecto cuando se envía por partes.
pub const PRIMING_PROMPT: &str = "A continuación tienes una parte del contenido del proyecto. \
Analízala y tenla en cuenta para las próximas preguntas. No es necesario responder.";

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Una ida y vuelta a `/chat`.
    async fn try_send(&self, text: &str, context: &str) -> Result<String>;

    /// Limpia la conversación en el servidor y devuelve su mensaje.
    async fn reset(&self) -> Result<String>;

    async fn related_files(&self, file_content: &str) -> Result<Vec<String>>;

    /// Como `try_send`, pero cualquier fallo se convierte en una respuesta
    /// `Error: ...` que se muestra como un mensaje más del bot.
    async fn send(&self, text: &str, context: &str) -> String {
        match self.try_send(text, context).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Fallo en la petición de chat: {e:#}");
                format!("Error: {e:#}")
            }
        }
    }
}

#[derive(Deserialize)]
struct RelatedFilesResponse {
    #[serde(default)]
    related_files: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ChatClient {
    http: Client,
    endpoint: EndpointConfig,
}

impl ChatClient {
    pub fn new(endpoint: EndpointConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = endpoint.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context("No se pudo construir el cliente HTTP")?;
        Ok(Self { http, endpoint })
    }

    async fn post_json(&self, url: Url, body: Option<&Value>) -> Result<Value> {
        let mut request = self.http.post(url.clone());
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("No se pudo contactar con {url}"))?
            .error_for_status()?;
        response
            .json::<Value>()
            .await
            .with_context(|| format!("Respuesta no válida de {url}"))
    }
}

#[async_trait]
impl ChatBackend for ChatClient {
    async fn try_send(&self, text: &str, context: &str) -> Result<String> {
        let url = self.endpoint.chat_url()?;
        let body = self
            .post_json(url, Some(&json!({ "text": text, "context": context })))
            .await?;
        Ok(reply_from_body(&body))
    }

    async fn reset(&self) -> Result<String> {
        let url = self.endpoint.reset_url()?;
        let body = self.post_json(url, None).await?;
        Ok(body
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| pretty(&body)))
    }

    async fn related_files(&self, file_content: &str) -> Result<Vec<String>> {
        let url = self.endpoint.related_files_url()?;
        let body = self
            .post_json(url, Some(&json!({ "file_content": file_content })))
            .await?;
        let parsed: RelatedFilesResponse =
            serde_json::from_value(body).context("Lista de ficheros relacionados no válida")?;
        Ok(parsed.related_files)
    }
}

/// `response` si es un texto no vacío; en otro caso el JSON completo formateado.
pub fn reply_from_body(body: &Value) -> String {
    match body.get("response").and_then(Value::as_str) {
        Some(reply) if !reply.is_empty() => reply.to_string(),
        _ => pretty(body),
    }
}

fn pretty(body: &Value) -> String {
    serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string())
}

/// Envía los lotes del proyecto uno detrás de otro. Un lote fallido se
/// registra y se pasa al siguiente. Devuelve el número de peticiones hechas.
pub async fn prime_project(backend: &dyn ChatBackend, batches: &[String]) -> usize {
    let total = batches.len();
    let mut calls = 0;
    for (index, batch) in batches.iter().enumerate() {
        calls += 1;
        match backend.try_send(PRIMING_PROMPT, batch).await {
            Ok(_) => info!("Lote {}/{} del proyecto enviado.", index + 1, total),
            Err(e) => error!("Error enviando el lote {}/{}: {e:#}", index + 1, total),
        }
    }
    calls
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use std::sync::Mutex;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client(base: &str) -> ChatClient {
        ChatClient::new(EndpointConfig::new(base).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn send_returns_response_field() {
        let base = serve(Router::new().route(
            "/chat",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["text"], "hola");
                assert_eq!(body["context"], "ctx");
                Json(json!({ "response": "hi" }))
            }),
        ))
        .await;

        assert_eq!(client(&base).send("hola", "ctx").await, "hi");
    }

    #[tokio::test]
    async fn send_falls_back_to_pretty_json() {
        let base = serve(Router::new()
            .route("/chat", post(|| async { Json(json!({})) }))
            .route("/api/chat", post(|| async { Json(json!({ "response": "", "n": 1 })) })))
        .await;

        assert_eq!(client(&base).send("x", "").await, "{}");
        assert_eq!(
            client(&format!("{base}/api")).send("x", "").await,
            "{\n  \"n\": 1,\n  \"response\": \"\"\n}"
        );
    }

    #[tokio::test]
    async fn send_reports_network_failure_as_error_reply() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let reply = client(&format!("http://{addr}")).send("x", "").await;
        assert!(reply.starts_with("Error:"), "{reply}");
    }

    #[tokio::test]
    async fn send_reports_http_status_as_error_reply() {
        let base = serve(Router::new().route(
            "/chat",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        ))
        .await;

        let reply = client(&base).send("x", "").await;
        assert!(reply.contains("Error:"));
        assert!(reply.contains("500"));
    }

    #[tokio::test]
    async fn reset_and_related_files_hit_their_endpoints() {
        let base = serve(Router::new()
            .route("/reset", post(|| async { Json(json!({ "message": "Conversación reiniciada" })) }))
            .route(
                "/related-files",
                post(|Json(body): Json<Value>| async move {
                    assert_eq!(body["file_content"], "import util");
                    Json(json!({ "related_files": ["util.py", "models.py"] }))
                }),
            ))
        .await;
        let client = client(&base);

        assert_eq!(client.reset().await.unwrap(), "Conversación reiniciada");
        assert_eq!(
            client.related_files("import util").await.unwrap(),
            vec!["util.py", "models.py"]
        );
    }

    struct CountingBackend {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatBackend for CountingBackend {
        async fn try_send(&self, _text: &str, context: &str) -> Result<String> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(context.to_string());
            if calls.len() == 2 {
                return Err(anyhow!("caído"));
            }
            Ok("ok".into())
        }

        async fn reset(&self) -> Result<String> {
            Ok(String::new())
        }

        async fn related_files(&self, _file_content: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn priming_continues_after_a_failed_batch() {
        let backend = CountingBackend { calls: Mutex::new(Vec::new()) };
        let batches = vec!["a".to_string(), "b".to_string(), "c".to_string()];

        let calls = tokio_test::block_on(prime_project(&backend, &batches));
        assert_eq!(calls, 3);
        assert_eq!(*backend.calls.lock().unwrap(), batches);
    }
}
