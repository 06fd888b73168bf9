use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::notice::{Notice, Notices};
use crate::session::{NewTreeOverrides, Session};

/// One line on stdin.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Request {
    /// `cursor` defaults to the end of `text`.
    Complete {
        text: String,
        cursor: Option<usize>,
    },
    Forest,
    New(NewTreeOverrides),
    Refresh,
}

/// One line on stdout.
#[derive(Debug, Serialize)]
pub struct Response {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub notices: Vec<Notice>,
}

/// Answer requests from stdin until it closes.
pub async fn serve(session: &Session, notices: &Notices) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    tracing::info!("serving requests on stdin");
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = handle_line(session, notices, &line).await;
        let mut text = serde_json::to_string(&response)?;
        text.push('\n');
        stdout.write_all(text.as_bytes()).await?;
        stdout.flush().await?;
    }
    tracing::info!("stdin closed");

    Ok(())
}

pub async fn handle_line(session: &Session, notices: &Notices, line: &str) -> Response {
    let request = match serde_json::from_str::<Request>(line) {
        Ok(request) => request,
        Err(err) => {
            tracing::warn!("bad request {line:?}: {err}");
            return Response {
                result: None,
                error: Some(format!("invalid request: {err}")),
                notices: notices.drain(),
            };
        }
    };

    let result = match handle(session, request).await {
        Ok(value) => value,
        Err(err) => {
            return Response {
                result: None,
                error: Some(err.to_string()),
                notices: notices.drain(),
            };
        }
    };

    Response {
        result: Some(result),
        error: None,
        notices: notices.drain(),
    }
}

async fn handle(session: &Session, request: Request) -> Result<Value> {
    let value = match request {
        Request::Complete { text, cursor } => {
            let cursor = cursor.unwrap_or_else(|| text.chars().count());
            serde_json::to_value(session.complete(&text, cursor).await)?
        }
        Request::Forest => serde_json::to_value(&*session.cache().get().await)?,
        Request::New(overrides) => serde_json::to_value(session.new_tree(overrides).await)?,
        Request::Refresh => {
            let forest = session.cache().refresh().await;
            serde_json::json!({ "trees": forest.len() })
        }
    };
    Ok(value)
}
