use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use albgate::middleware::{
    AlbAuth, ApiKey, Middleware, MiddlewareChain, Next, PanicGuard, RequestLog, TimeoutGuard,
};
use albgate::{
    AlbCodec, BoxFuture, EventCodec, Failure, InboundEvent, Json, OutboundEvent, Problems, ProxyAdapter, Request,
    RequestContext, Respond, ResponseCapture, Validate,
};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use bytes::Bytes;
use http::{HeaderValue, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};

const TRACE: &str = "Root=1-67891233-abcdef012345678912345678";

fn event(method: &str, path: &str, headers: &[(&str, &str)]) -> InboundEvent {
    InboundEvent {
        http_method: method.to_owned(),
        path: path.to_owned(),
        headers: headers.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect(),
        ..InboundEvent::default()
    }
}

fn body_json(out: &OutboundEvent) -> Value {
    serde_json::from_str(&out.body).unwrap()
}

fn oidc_token(claims: &Value) -> String {
    format!("eyJ0eXAiOiJKV1QifQ.{}.c2ln", URL_SAFE_NO_PAD.encode(claims.to_string()))
}

async fn ok(req: Request) -> Result<Json<Value>, Failure> {
    Ok(Json::ok(json!({ "path": req.path() })))
}

// ── Translation ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn valid_event_yields_valid_reply() {
    let adapter = ProxyAdapter::new(MiddlewareChain::new().with(RequestLog).handler(ok));

    let out = adapter.handle(event("GET", "/health", &[("x-amzn-trace-id", TRACE)])).await;

    assert_eq!(out.status_code, 200);
    assert_eq!(out.status_description, "200 OK");
    assert_eq!(out.headers["content-type"], "application/json");
    assert_eq!(out.headers["app-trace-id"], TRACE);
    assert_eq!(body_json(&out), json!({ "path": "/health" }));
    assert!(!out.is_base64_encoded);
}

#[tokio::test]
async fn raw_wire_payload_is_served() {
    let adapter = ProxyAdapter::new(MiddlewareChain::new().handler(ok));
    let payload = json!({
        "requestContext": { "elb": { "targetGroupArn": "arn:aws:elasticloadbalancing:eu-west-1:1:targetgroup/t/1" } },
        "httpMethod": "GET",
        "path": "/items",
        "queryStringParameters": null,
        "multiValueHeaders": { "accept": ["application/json"], "x-amzn-trace-id": [TRACE] },
        "isBase64Encoded": false,
        "body": null
    });

    let out = adapter.handle_value(payload).await;

    assert_eq!(out.status_code, 200);
    assert_eq!(out.multi_value_headers["app-trace-id"], [TRACE]);
    assert!(out.headers.is_empty());
}

#[tokio::test]
async fn undecodable_event_is_gateway_timeout() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let adapter = ProxyAdapter::new(MiddlewareChain::new().handler(move |_req: Request| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok::<_, Failure>(StatusCode::OK) }
    }));

    let mut bad_body = event("POST", "/", &[]);
    bad_body.is_base64_encoded = true;
    bad_body.body = Some("not base64!".to_owned());

    for ev in [event("GET", "relative", &[]), event("", "/", &[]), bad_body] {
        let out = adapter.handle(ev).await;
        assert_eq!(out.status_code, 504);
        assert_eq!(out.status_description, "504 Gateway Timeout");
        assert!(out.body.is_empty());
        assert!(out.headers.is_empty() && out.multi_value_headers.is_empty());
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unencodable_response_is_gateway_timeout() {
    struct Latin1Header;

    impl Respond for Latin1Header {
        fn respond(self, w: &mut ResponseCapture, _trace_id: &str) {
            w.headers_mut().insert("x-name", HeaderValue::from_bytes(b"caf\xe9").unwrap());
            w.write_status(StatusCode::OK);
        }
    }

    let adapter = ProxyAdapter::new(
        MiddlewareChain::new().handler(|_req: Request| async { Ok::<_, Failure>(Latin1Header) }),
    );

    assert_eq!(adapter.handle(event("GET", "/", &[])).await, OutboundEvent::gateway_timeout());
}

#[test]
fn reply_round_trips_through_the_codec() {
    let response = http::Response::builder()
        .status(StatusCode::CREATED)
        .header("X-Foo", "bar")
        .header("content-type", "application/json")
        .body(Bytes::from_static(br#"{"a":1}"#))
        .unwrap();

    let out = AlbCodec.encode(response, false).unwrap();
    let back = AlbCodec.decode_response(&out).unwrap();

    assert_eq!(back.status(), StatusCode::CREATED);
    assert_eq!(back.headers()["x-foo"], "bar");
    assert_eq!(back.body().as_ref(), br#"{"a":1}"#);
}

// ── Panics ────────────────────────────────────────────────────────────────────

async fn explode(req: Request) -> Result<Json<Value>, Failure> {
    if req.path() == "/boom" {
        panic!("database handle poisoned");
    }
    Ok(Json::ok(json!("fine")))
}

#[tokio::test]
async fn panic_becomes_500_and_adapter_keeps_serving() {
    let adapter = ProxyAdapter::new(MiddlewareChain::new().with(PanicGuard::new()).handler(explode));

    let out = adapter.handle(event("GET", "/boom", &[("x-amzn-trace-id", TRACE)])).await;
    assert_eq!(out.status_code, 500);
    assert_eq!(out.headers["app-trace-id"], TRACE);
    assert_eq!(body_json(&out), json!({ "message": "Internal Server Error", "traceID": TRACE }));

    let out = adapter.handle(event("GET", "/boom", &[])).await;
    assert_eq!(out.status_code, 500);
    assert_eq!(body_json(&out)["traceID"], "");

    let out = adapter.handle(event("GET", "/after", &[])).await;
    assert_eq!(out.status_code, 200);
    assert_eq!(body_json(&out), json!("fine"));
}

#[tokio::test]
async fn exposed_panic_message_reaches_the_client() {
    let adapter = ProxyAdapter::new(
        MiddlewareChain::new().with(PanicGuard::new().expose_messages(true)).handler(explode),
    );

    let out = adapter.handle(event("GET", "/boom", &[])).await;

    assert_eq!(out.status_code, 500);
    assert_eq!(body_json(&out)["message"], "database handle poisoned");
}

struct Tripwire;

impl Middleware for Tripwire {
    fn name(&self) -> &'static str {
        "tripwire"
    }

    fn process<'a>(&'a self, w: &'a mut ResponseCapture, req: Request, next: Next<'a>) -> BoxFuture<'a> {
        Box::pin(async move {
            if req.header("x-trip").is_some() {
                panic!("tripwire hit");
            }
            next.run(w, req).await
        })
    }
}

#[tokio::test]
async fn panic_in_a_nested_stage_becomes_500() {
    let adapter = ProxyAdapter::new(
        MiddlewareChain::new()
            .with(PanicGuard::new())
            .with(RequestLog)
            .with(Tripwire)
            .with(AlbAuth::new())
            .handler(whoami),
    );

    let out = adapter
        .handle(event("GET", "/me", &[("x-trip", "1"), ("x-amzn-trace-id", TRACE)]))
        .await;

    assert_eq!(out.status_code, 500);
    assert_eq!(body_json(&out), json!({ "message": "Internal Server Error", "traceID": TRACE }));
}

#[tokio::test]
async fn panic_before_the_handler_future_exists_becomes_500() {
    let adapter = ProxyAdapter::new(
        MiddlewareChain::new()
            .with(PanicGuard::new())
            .with(TimeoutGuard::new(Duration::from_secs(1)))
            .with(AlbAuth::new())
            .handler(|req: Request| {
                let _ = req.path().as_bytes()[100];
                async { Ok::<_, Failure>(Json::ok("unreachable")) }
            }),
    );
    let token = oidc_token(&json!({ "email": "ada@example.com" }));

    let out = adapter
        .handle(event("GET", "/", &[("x-amzn-oidc-data", token.as_str()), ("x-amzn-trace-id", TRACE)]))
        .await;

    assert_eq!(out.status_code, 500);
    assert_eq!(out.headers["app-trace-id"], TRACE);
    assert_eq!(body_json(&out)["traceID"], TRACE);
}

// ── Authentication ────────────────────────────────────────────────────────────

#[tokio::test]
async fn api_key_mismatch_never_reaches_the_handler() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let adapter = ProxyAdapter::new(MiddlewareChain::new().with(ApiKey::new("s3cret")).handler(
        move |_req: Request| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, Failure>(StatusCode::NO_CONTENT) }
        },
    ));

    for headers in [&[][..], &[("x-api-key", "wrong")][..], &[("X-API-KEY", "S3CRET")][..]] {
        let out = adapter.handle(event("GET", "/", headers)).await;
        assert_eq!(out.status_code, 403);
        assert_eq!(body_json(&out)["message"], "invalid api-key");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let out = adapter.handle(event("GET", "/", &[("X-API-KEY", "s3cret")])).await;
    assert_eq!(out.status_code, 204);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

async fn whoami(req: Request) -> Result<Json<Value>, Failure> {
    let ctx = req.context();
    Ok(Json::ok(json!({
        "email": ctx.email(),
        "name": ctx.name(),
        "phone": ctx.phone(),
        "role": ctx.role(),
        "traceID": ctx.trace_id(),
    })))
}

#[tokio::test]
async fn malformed_oidc_data_is_rejected() {
    let adapter = ProxyAdapter::new(MiddlewareChain::new().with(AlbAuth::new()).handler(whoami));
    let not_json = format!("h.{}.s", URL_SAFE_NO_PAD.encode("{not json"));

    for token in ["", "only.two", "h.***.s", not_json.as_str()] {
        let out = adapter
            .handle(event("GET", "/me", &[("x-amzn-oidc-data", token), ("x-amzn-trace-id", TRACE)]))
            .await;
        assert_eq!(out.status_code, 403, "token {token:?}");
        assert_eq!(body_json(&out), json!({ "message": "invalid token", "traceID": TRACE }));
    }
}

#[tokio::test]
async fn claims_are_readable_in_the_handler() {
    let adapter = ProxyAdapter::new(
        MiddlewareChain::new().with(AlbAuth::new().role_claim("custom:attmgt")).handler(whoami),
    );
    let token = oidc_token(&json!({
        "sub": "b9f3",
        "email": "grace@example.com",
        "name": "Grace",
        "phone_number": "+15550100",
        "custom:attmgt": "auditor",
        "exp": 1_900_000_000
    }));

    let out = adapter
        .handle(event("GET", "/me", &[("x-amzn-oidc-data", token.as_str()), ("x-amzn-trace-id", TRACE)]))
        .await;

    assert_eq!(out.status_code, 200);
    assert_eq!(
        body_json(&out),
        json!({
            "email": "grace@example.com",
            "name": "Grace",
            "phone": "+15550100",
            "role": "auditor",
            "traceID": TRACE,
        })
    );
}

#[tokio::test]
async fn repeated_reply_headers_reach_the_wire() {
    let adapter = ProxyAdapter::new(MiddlewareChain::new().handler(|_req: Request| async {
        Ok::<_, Failure>(Json::ok(json!("set")).header("set-cookie", "a=1").header("set-cookie", "b=2"))
    }));
    let mut ev = event("GET", "/login", &[]);
    ev.multi_value_headers = HashMap::from([("x-amzn-trace-id".to_owned(), vec![TRACE.to_owned()])]);

    let out = adapter.handle(ev).await;

    assert_eq!(out.status_code, 200);
    assert_eq!(out.multi_value_headers["set-cookie"], ["a=1", "b=2"]);
}

// ── Deadlines ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn handler_observes_the_deadline() {
    let adapter = ProxyAdapter::new(MiddlewareChain::new().with(TimeoutGuard::new(Duration::from_millis(10))).handler(
        |req: Request| async move {
            let Some(deadline) = req.context().deadline().cloned() else {
                return Err(Failure::internal("no deadline"));
            };
            tokio::select! {
                () = deadline.cancelled() => Ok::<_, Failure>(Json::new(StatusCode::SERVICE_UNAVAILABLE, json!("gave up"))),
                () = tokio::time::sleep(Duration::from_millis(100)) => Ok::<_, Failure>(Json::ok(json!("finished"))),
            }
        },
    ));

    let out = adapter.handle(event("GET", "/slow", &[])).await;

    assert_eq!(out.status_code, 503);
    assert_eq!(body_json(&out), json!("gave up"));
}

#[tokio::test]
async fn handler_ignoring_the_deadline_keeps_its_reply() {
    let adapter = ProxyAdapter::new(MiddlewareChain::new().with(TimeoutGuard::new(Duration::from_millis(10))).handler(
        |req: Request| async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let expired = req.context().deadline().is_some_and(|d| d.is_cancelled());
            Ok::<_, Failure>(Json::new(StatusCode::ACCEPTED, json!({ "expired": expired })))
        },
    ));

    let out = adapter.handle(event("GET", "/slow", &[])).await;

    assert_eq!(out.status_code, 202);
    assert_eq!(body_json(&out), json!({ "expired": true }));
}

// ── Validation ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct Signup {
    email: String,
    age: u8,
}

impl Validate for Signup {
    fn validate(&self, _ctx: &RequestContext) -> Problems {
        let mut problems = Problems::new();
        if !self.email.contains('@') {
            problems.insert("email".into(), "must be an email address".into());
        }
        if self.age < 18 {
            problems.insert("age".into(), "must be at least 18".into());
        }
        problems
    }
}

async fn signup(req: Request) -> Result<Json<Value>, Failure> {
    let signup: Signup = req.json_valid()?;
    Ok(Json::new(StatusCode::CREATED, json!({ "email": signup.email })))
}

#[tokio::test]
async fn request_bodies_are_decoded_and_validated() {
    let adapter = ProxyAdapter::new(MiddlewareChain::new().handler(signup));
    let post = |body: &str| {
        let mut ev = event("POST", "/signup", &[("x-amzn-trace-id", TRACE)]);
        ev.body = Some(body.to_owned());
        ev
    };

    let out = adapter.handle(post(r#"{"email":"ada@example.com","age":36}"#)).await;
    assert_eq!(out.status_code, 201);

    let out = adapter.handle(post(r#"{"email":"ada","age":7}"#)).await;
    assert_eq!(out.status_code, 422);
    assert_eq!(
        body_json(&out),
        json!({
            "message": "validation failed",
            "traceID": TRACE,
            "problems": { "age": "must be at least 18", "email": "must be an email address" },
        })
    );

    let out = adapter.handle(post("{")).await;
    assert_eq!(out.status_code, 400);
    assert_eq!(body_json(&out)["message"], "invalid request body");
}

// ── Full chain ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn standard_chain_from_config() {
    let vars: HashMap<&str, &str> = HashMap::from([("APP_API_KEY", "k"), ("APP_REQUEST_TIMEOUT_MS", "50")]);
    let config = albgate::Config::from_lookup(|key| vars.get(key).map(|v| (*v).to_owned())).unwrap();
    let chain = MiddlewareChain::from_config(&config).with(AlbAuth::new());
    assert_eq!(chain.len(), 5);
    let adapter = ProxyAdapter::new(chain.handler(whoami));

    let token = oidc_token(&json!({ "email": "lin@example.com" }));
    let out = adapter
        .handle(event("GET", "/me", &[("x-api-key", "k"), ("x-amzn-oidc-data", token.as_str())]))
        .await;
    assert_eq!(out.status_code, 200);
    assert_eq!(body_json(&out)["email"], "lin@example.com");

    let out = adapter.handle(event("GET", "/me", &[("x-amzn-oidc-data", token.as_str())])).await;
    assert_eq!(out.status_code, 403);
}
