use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::model::{FeatureMatrix, GradePredictor};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct PredictionRequest<'a> {
    instances: &'a [Vec<f64>],
}

#[derive(Deserialize)]
struct PredictionResponse {
    predictions: Vec<f64>,
}

/// A model-serving URL that answers `{"instances": ...}` with `{"predictions": ...}`.
#[derive(Clone)]
pub struct RemoteEndpoint {
    url: String,
    agent: ureq::Agent,
}

impl std::fmt::Debug for RemoteEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteEndpoint").field("url", &self.url).finish()
    }
}

impl RemoteEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .build();
        RemoteEndpoint {
            url: url.into(),
            agent,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn predict_rows(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        debug!(url = %self.url, instances = rows.len(), "calling prediction endpoint");

        let response = match self
            .agent
            .post(&self.url)
            .set("Accept", "application/json")
            .send_json(PredictionRequest { instances: rows })
        {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => {
                let body = response.into_string().unwrap_or_default();
                return Err(PipelineError::Remote(format!("HTTP {code}: {body}")));
            }
            Err(ureq::Error::Transport(err)) => {
                return Err(PipelineError::Remote(err.to_string()));
            }
        };

        let parsed: PredictionResponse = response
            .into_json()
            .map_err(|e| PipelineError::Remote(format!("invalid response body: {e}")))?;

        if parsed.predictions.len() != rows.len() {
            return Err(PipelineError::Remote(format!(
                "expected {} predictions, got {}",
                rows.len(),
                parsed.predictions.len()
            )));
        }
        Ok(parsed.predictions)
    }
}

impl GradePredictor for RemoteEndpoint {
    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        self.predict_rows(&features.rows())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Serves one request with the given JSON body and hands back the request body.
    fn serve_once(status: &str, body: &'static str) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/predict", listener.local_addr().unwrap());
        let status = status.to_string();

        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());

            let mut content_length = 0;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap();
                    }
                }
            }
            let mut request = vec![0; content_length];
            reader.read_exact(&mut request).unwrap();

            let mut stream = stream;
            write!(
                stream,
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
            .unwrap();
            String::from_utf8(request).unwrap()
        });

        (url, handle)
    }

    fn matrix() -> FeatureMatrix {
        let values = ndarray::array![[2.0, 1.0], [4.0, 0.0]];
        FeatureMatrix::new(vec!["hours_studied".into(), "extra_curricular".into()], values)
    }

    #[test]
    fn sends_instances_and_reads_predictions() {
        let (url, server) = serve_once("200 OK", r#"{"predictions": [61.5, 72.0]}"#);
        let endpoint = RemoteEndpoint::new(url);

        let predictions = endpoint.predict(&matrix()).unwrap();
        assert_eq!(predictions, vec![61.5, 72.0]);

        let sent: serde_json::Value = serde_json::from_str(&server.join().unwrap()).unwrap();
        assert_eq!(sent, serde_json::json!({"instances": [[2.0, 1.0], [4.0, 0.0]]}));
    }

    #[test]
    fn prediction_count_must_match() {
        let (url, server) = serve_once("200 OK", r#"{"predictions": [61.5]}"#);
        let result = RemoteEndpoint::new(url).predict(&matrix());
        server.join().unwrap();
        assert!(matches!(result, Err(PipelineError::Remote(msg)) if msg.contains("expected 2")));
    }

    #[test]
    fn server_errors_are_reported() {
        let (url, server) = serve_once("500 Internal Server Error", r#"{"error": "down"}"#);
        let result = RemoteEndpoint::new(url).predict(&matrix());
        server.join().unwrap();
        assert!(matches!(result, Err(PipelineError::Remote(msg)) if msg.starts_with("HTTP 500")));
    }
}
