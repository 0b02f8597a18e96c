//! Inbound Plex webhook listener.

use std::io::Read;
use std::sync::Arc;
use std::thread;

use tiny_http::{Method, Response, Server};
use tokio::sync::broadcast;

use crate::error::RelayError;
use crate::fanout::ViewerEvent;
use crate::playback::{self, WebhookPayload};
use crate::session::SessionEngine;

/// Blocking HTTP server receiving Plex webhook POSTs on a dedicated
/// thread. Plex fires webhooks blind and never interprets the response,
/// so every POST is acknowledged with `200 OK` whatever happens inside;
/// failures are logged and the event dropped.
pub struct WebhookServer {
    pub port: u16,
}

impl WebhookServer {
    pub fn start(
        bind: &str,
        engine: Arc<SessionEngine>,
        fanout: broadcast::Sender<ViewerEvent>,
    ) -> Result<Self, String> {
        let server =
            Server::http(bind).map_err(|e| format!("Failed to start webhook listener: {}", e))?;

        let port = server
            .server_addr()
            .to_ip()
            .ok_or("Failed to get listener address")?
            .port();

        tracing::info!("Webhook listener started on port {}", port);

        thread::spawn(move || {
            Self::run_server(server, engine, fanout);
        });

        Ok(Self { port })
    }

    fn run_server(
        server: Server,
        engine: Arc<SessionEngine>,
        fanout: broadcast::Sender<ViewerEvent>,
    ) {
        for mut request in server.incoming_requests() {
            if request.method() != &Method::Post {
                request
                    .respond(Response::from_string("Method Not Allowed").with_status_code(405))
                    .ok();
                continue;
            }

            if let Err(e) = Self::handle_event(&mut request, &engine, &fanout) {
                tracing::warn!("dropping webhook event: {}", e);
            }

            request.respond(Response::from_string("OK")).ok();
        }
    }

    fn handle_event(
        request: &mut tiny_http::Request,
        engine: &Arc<SessionEngine>,
        fanout: &broadcast::Sender<ViewerEvent>,
    ) -> Result<(), RelayError> {
        let mut body = String::new();
        request
            .as_reader()
            .read_to_string(&mut body)
            .map_err(|e| RelayError::MalformedPayload(format!("unreadable body: {e}")))?;

        let payload = extract_payload(&body)
            .ok_or_else(|| RelayError::MalformedPayload("missing payload field".into()))?;

        let raw: WebhookPayload = serde_json::from_str(&payload)
            .map_err(|e| RelayError::MalformedPayload(e.to_string()))?;
        let fact = playback::normalize(raw)?;

        // Mirror the event to remote viewers; no receivers is fine.
        if let Some(event) = ViewerEvent::from_fact(&fact) {
            let _ = fanout.send(event);
        }

        engine.handle(fact);
        Ok(())
    }
}

/// Pull the JSON document out of the form-encoded request body.
fn extract_payload(body: &str) -> Option<String> {
    url::form_urlencoded::parse(body.as_bytes())
        .find_map(|(key, value)| (key == "payload").then(|| value.into_owned()))
}
