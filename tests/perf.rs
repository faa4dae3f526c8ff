//! Load tests against a running server (`YATUBE_BIND_ADDR=127.0.0.1:8000`).
//! Run with `--features perf -- --ignored`.
#![cfg(feature = "perf")]

use std::time::Instant;

const BASE_URL: &str = "http://127.0.0.1:8000";
const NUM_USERS: usize = 100;
const POSTS_PER_USER: usize = 2;
const PASSWORD: &str = "password123";

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

/// Signs a user up and returns the session cookie pair.
async fn signup(client: &reqwest::Client, username: &str) -> Option<String> {
    let resp = client
        .post(format!("{}/auth/signup/", BASE_URL))
        .form(&[("username", username), ("password", PASSWORD)])
        .send()
        .await
        .ok()?;
    if resp.status() != 302 {
        return None;
    }
    let cookie = resp.headers().get("set-cookie")?.to_str().ok()?;
    cookie.split(';').next().map(|s| s.to_string())
}

#[ignore]
#[tokio::test(flavor = "multi_thread")]
async fn perf_test_users_with_posts() {
    let client = client();
    let start = Instant::now();

    println!("\n=== Performance Test ===");
    println!("Creating {} users with {} posts each...", NUM_USERS, POSTS_PER_USER);

    let mut sessions = Vec::new();
    let user_creation_start = Instant::now();
    for i in 0..NUM_USERS {
        let username = format!("perf_user_{}_{}", i, &uuid::Uuid::new_v4().to_string()[0..8]);
        if let Some(cookie) = signup(&client, &username).await {
            sessions.push(cookie);
        }
    }
    let user_creation_time = user_creation_start.elapsed();
    println!(
        "User creation done: {} users in {:.2}s",
        sessions.len(),
        user_creation_time.as_secs_f64()
    );

    let post_creation_start = Instant::now();
    let mut posts_created = 0;
    let mut posts_failed = 0;
    for (idx, cookie) in sessions.iter().enumerate() {
        for post_num in 0..POSTS_PER_USER {
            let text = format!(
                "Post {} from user {} - Perf test at {}",
                post_num + 1,
                idx,
                chrono::Utc::now().to_rfc3339()
            );
            let resp = client
                .post(format!("{}/create/", BASE_URL))
                .header("Cookie", cookie)
                .form(&[("text", text.as_str())])
                .send()
                .await;
            match resp {
                Ok(r) if r.status() == 302 => posts_created += 1,
                _ => posts_failed += 1,
            }
        }
    }
    let post_creation_time = post_creation_start.elapsed();

    let fetch_start = Instant::now();
    for page in 1..=5 {
        let _ = client.get(format!("{}/?page={}", BASE_URL, page)).send().await;
    }
    let fetch_time = fetch_start.elapsed();

    let total_time = start.elapsed();
    let total_requests = sessions.len() + posts_created + posts_failed + 5;

    println!("\n=== Results ===");
    println!("Total time: {:.2}s", total_time.as_secs_f64());
    println!("Post creation: {:.2}s", post_creation_time.as_secs_f64());
    println!("Posts created: {}", posts_created);
    println!("Posts failed: {}", posts_failed);
    println!("Index fetch (5 pages): {:.2}ms", fetch_time.as_millis());
    println!(
        "Throughput: {:.0} requests/sec",
        total_requests as f64 / total_time.as_secs_f64()
    );
}
