#[cfg(not(target_arch = "wasm32"))]
mod native {
    extern crate yatube;

    use actix_web::{web, App, HttpServer, HttpRequest, HttpResponse};
    use yatube::core::store::MemoryStore;

    mod adapter {
        use actix_web::HttpRequest;
        use spin_sdk::http::{Request, Method};

        pub fn actix_to_spin_request(
            req: &HttpRequest,
            body: actix_web::web::Bytes,
        ) -> Request {
            let method = match req.method().as_str() {
                "GET" => Method::Get,
                "POST" => Method::Post,
                "PUT" => Method::Put,
                "DELETE" => Method::Delete,
                "HEAD" => Method::Head,
                "OPTIONS" => Method::Options,
                "PATCH" => Method::Patch,
                other => Method::Other(other.to_string()),
            };

            let uri = req.uri().to_string();

            let mut builder = Request::builder();
            builder.method(method).uri(uri);

            // Copy headers
            for (name, value) in req.headers() {
                if let Ok(val_str) = value.to_str() {
                    builder.header(name.as_str(), val_str);
                }
            }

            builder.body(body.to_vec()).build()
        }

        pub fn spin_to_actix_response(spin_resp: spin_sdk::http::Response) -> actix_web::HttpResponse {
            let status = *spin_resp.status();

            let mut response = actix_web::HttpResponse::build(
                actix_web::http::StatusCode::from_u16(status)
                    .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR),
            );
            for (name, value) in spin_resp.headers() {
                if let Some(val_str) = value.as_str() {
                    response.append_header((name.to_string(), val_str.to_string()));
                }
            }

            response.body(spin_resp.body().to_vec())
        }

        #[cfg(test)]
        mod tests {
            use super::*;
            use actix_web::http::Method as ActixMethod;
            use actix_web::test::TestRequest;

            #[test]
            fn unknown_verbs_are_passed_through() {
                let req = TestRequest::with_uri("/")
                    .method(ActixMethod::from_bytes(b"PURGE").unwrap())
                    .to_http_request();
                let spin_req = actix_to_spin_request(&req, actix_web::web::Bytes::new());
                assert!(matches!(spin_req.method(), Method::Other(m) if m == "PURGE"));
            }

            #[test]
            fn headers_and_body_are_copied() {
                let req = TestRequest::post()
                    .uri("/create/?x=1")
                    .insert_header(("Content-Type", "application/json"))
                    .to_http_request();
                let spin_req = actix_to_spin_request(&req, actix_web::web::Bytes::from_static(b"{}"));
                assert!(matches!(spin_req.method(), Method::Post));
                assert_eq!(
                    spin_req.header("content-type").and_then(|h| h.as_str()),
                    Some("application/json")
                );
                assert_eq!(spin_req.body(), b"{}");
            }
        }
    }

    pub async fn run() -> std::io::Result<()> {
        let store = web::Data::new(MemoryStore::new());
        if yatube::config::seed_demo_data() {
            if let Err(e) = yatube::core::db::init_demo_data(store.get_ref()) {
                tracing::error!(error = %e, "failed to seed demo data");
            }
        }

        let addr = yatube::config::bind_addr();
        tracing::info!("Server listening on http://{}", addr);

        HttpServer::new(move || {
            App::new()
                .app_data(store.clone())
                .default_service(web::route().to(handle_all))
        })
        .bind(addr)?
        .run()
        .await
    }

    async fn handle_all(store: web::Data<MemoryStore>, req: HttpRequest, body: web::Bytes) -> HttpResponse {
        let method = req.method().clone();
        let path = req.path().to_string();

        let spin_req = adapter::actix_to_spin_request(&req, body);
        let spin_resp = yatube::handle(store.get_ref(), spin_req);
        tracing::info!(%method, %path, status = *spin_resp.status(), "request");

        adapter::spin_to_actix_response(spin_resp)
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    native::run().await
}

#[cfg(target_arch = "wasm32")]
fn main() {}
