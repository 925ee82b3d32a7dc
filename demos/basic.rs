//! Minimal albgate example: one JSON endpoint behind the standard chain.
//!
//! On the function host (AWS_LAMBDA_RUNTIME_API set) it serves invocations
//! behind AlbAuth; anywhere else it serves the chain without the claims stage
//! over HTTP on APP_LOCAL_ADDR.
//!
//! Run with:
//!   APP_LOG_FORMAT=pretty RUST_LOG=debug cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/notes
//!   curl -X POST http://localhost:3000/notes \
//!        -H 'content-type: application/json' \
//!        -d '{"title":"groceries","body":"milk"}'
//!   curl -X POST http://localhost:3000/notes -d '{"title":"","body":""}'

use std::time::Duration;

use albgate::middleware::{AlbAuth, MiddlewareChain};
use albgate::{Config, Failure, Json, Problems, ProxyAdapter, Request, RequestContext, Server, Validate};
use http::{Method, StatusCode};
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
struct NewNote {
    title: String,
    body: String,
}

impl Validate for NewNote {
    fn validate(&self, ctx: &RequestContext) -> Problems {
        let mut problems = Problems::new();
        if self.title.trim().is_empty() {
            problems.insert("title".into(), "must not be empty".into());
        }
        if self.title.starts_with("pinned:") && ctx.role() != Some("admin") {
            problems.insert("title".into(), "only admins may pin notes".into());
        }
        if self.body.len() > 4096 {
            problems.insert("body".into(), "must be at most 4096 bytes".into());
        }
        problems
    }
}

#[derive(Serialize)]
struct Note {
    title: String,
    body: String,
    author: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = Config::from_env()?;
    albgate::logging::init(config.log_format);

    let chain = MiddlewareChain::from_config(&config);

    // Only the load balancer sends X-Amzn-Oidc-Data; local requests carry no claims.
    if std::env::var_os("AWS_LAMBDA_RUNTIME_API").is_some() {
        let pipeline = chain.with(AlbAuth::new().role_claim(&config.role_claim)).handler(notes);
        albgate::lambda::run(ProxyAdapter::new(pipeline)).await?;
    } else {
        Server::from_addr(config.local_addr).serve(chain.handler(notes)).await?;
    }
    Ok(())
}

// GET  /notes → the caller's identity
// POST /notes → validated echo, 201
async fn notes(req: Request) -> Result<Json<Note>, Failure> {
    let author = req.context().email().map(str::to_owned);

    match *req.method() {
        Method::POST => {
            let new: NewNote = req.json_valid()?;

            // Pretend storage; gives up early when the deadline passes.
            if let Some(deadline) = req.context().deadline() {
                tokio::select! {
                    () = deadline.cancelled() => return Err(Failure::internal("storage timed out")),
                    () = tokio::time::sleep(Duration::from_millis(5)) => {}
                }
            }

            Ok(Json::new(StatusCode::CREATED, Note { title: new.title, body: new.body, author })
                .header("location", "/notes/1"))
        }
        _ => Ok(Json::ok(Note { title: "welcome".into(), body: String::new(), author })),
    }
}
