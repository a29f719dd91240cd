use actix_web::{test, App};
use pacepulse::repo::inmem::InMemRepo;
use pacepulse::routes::config;
use pacepulse::{AppState, RedirectUrls};
use serial_test::serial;
use std::sync::Arc;

// Fresh snapshot dir per test so in-memory state never leaks across runs.
fn setup_env() {
    std::env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
    std::env::set_var("PACEPULSE_DATA_DIR", tempfile::tempdir().unwrap().path());
}

fn state(repo: InMemRepo) -> AppState {
    AppState {
        repo: Arc::new(repo),
        gateway: None,
        urls: RedirectUrls {
            server_base: "http://server.test".into(),
            client_base: "http://client.test".into(),
        },
    }
}

macro_rules! init_app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(actix_web::web::Data::new($state))
                .configure(config),
        )
        .await
    };
}

macro_rules! create_marathon {
    ($app:expr, $body:expr $(,)?) => {{
        let req = test::TestRequest::post().uri("/marathon").set_json(&$body).to_request();
        let resp = test::call_service($app, req).await;
        assert!(resp.status().is_success());
        let v: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
        v["insertedId"].as_str().unwrap().to_string()
    }};
}

#[actix_web::test]
#[serial]
async fn liveness_string() {
    setup_env();
    let app = init_app!(state(InMemRepo::new(false)));
    let req = test::TestRequest::get().uri("/").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    assert_eq!(test::read_body(resp).await, "Pace Pulse server is running");
}

#[actix_web::test]
#[serial]
async fn marathon_crud_flow() {
    setup_env();
    let app = init_app!(state(InMemRepo::new(false)));

    let id = create_marathon!(
        &app,
        serde_json::json!({
            "title": "Dhaka 10K",
            "startRegDate": "2099-01-01T00:00:00Z",
            "endRegDate": "2099-02-01T00:00:00Z",
            "marathonStartDate": "2099-03-01T00:00:00Z",
            "createdBy": "host@x.com",
            "regCount": 0,
            "location": "Hatirjheel"
        }),
    );
    assert_eq!(id.len(), 24);

    // fetch it back, extra field included
    let req = test::TestRequest::get().uri(&format!("/marathons/{id}")).to_request();
    let resp = test::call_service(&app, req).await;
    let v: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v["title"], "Dhaka 10K");
    assert_eq!(v["location"], "Hatirjheel");
    assert_eq!(v["_id"]["$oid"].as_str().unwrap(), id);

    // replace wholesale: fields missing from the payload are gone afterwards
    let req = test::TestRequest::put()
        .uri(&format!("/marathon/{id}"))
        .set_json(&serde_json::json!({ "title": "Dhaka 10K (rescheduled)", "regCount": 0 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let v: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v["matchedCount"], 1);

    let req = test::TestRequest::get().uri(&format!("/marathons/{id}")).to_request();
    let resp = test::call_service(&app, req).await;
    let v: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v["title"], "Dhaka 10K (rescheduled)");
    assert!(v.get("location").is_none());

    // increment twice, decrement once
    for path in ["increment", "increment", "decrement"] {
        let req = test::TestRequest::patch()
            .uri(&format!("/marathon/{path}/{id}"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
    }
    let req = test::TestRequest::get().uri(&format!("/marathons/{id}")).to_request();
    let resp = test::call_service(&app, req).await;
    let v: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v["regCount"], 1);

    // delete, then delete again: absence is a zero count, not an error
    let req = test::TestRequest::delete().uri(&format!("/allmarathons/{id}")).to_request();
    let resp = test::call_service(&app, req).await;
    let v: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v["deletedCount"], 1);

    let req = test::TestRequest::delete().uri(&format!("/allmarathons/{id}")).to_request();
    let resp = test::call_service(&app, req).await;
    let v: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v["deletedCount"], 0);

    // a missing marathon reads as null, status 200
    let req = test::TestRequest::get().uri(&format!("/marathons/{id}")).to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    assert_eq!(test::read_body(resp).await, "null");
}

#[actix_web::test]
#[serial]
async fn put_creates_missing_marathon() {
    setup_env();
    let app = init_app!(state(InMemRepo::new(false)));
    let id = "64b1f0aa12cd34ef56ab7890";

    let req = test::TestRequest::put()
        .uri(&format!("/marathon/{id}"))
        .set_json(&serde_json::json!({ "title": "Phantom Run", "regCount": 0 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let v: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v["matchedCount"], 0);
    assert_eq!(v["upsertedId"].as_str().unwrap(), id);

    let req = test::TestRequest::get().uri(&format!("/marathons/{id}")).to_request();
    let resp = test::call_service(&app, req).await;
    let v: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v["title"], "Phantom Run");
    assert_eq!(v["_id"]["$oid"].as_str().unwrap(), id);
}

#[actix_web::test]
#[serial]
async fn bare_decrement_goes_negative() {
    setup_env();
    let app = init_app!(state(InMemRepo::new(false)));
    let id = create_marathon!(&app, serde_json::json!({ "title": "Fresh", "regCount": 0 }));

    let req = test::TestRequest::patch()
        .uri(&format!("/marathon/decrement/{id}"))
        .to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::get().uri(&format!("/marathons/{id}")).to_request();
    let resp = test::call_service(&app, req).await;
    let v: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v["regCount"], -1);
}

#[actix_web::test]
#[serial]
async fn upcoming_excludes_closed_registration() {
    setup_env();
    let app = init_app!(state(InMemRepo::new(false)));
    create_marathon!(&app, serde_json::json!({ "title": "Past", "endRegDate": "2000-01-01" }));
    create_marathon!(
        &app,
        serde_json::json!({ "title": "Open A", "endRegDate": "2099-12-31T00:00:00Z" }),
    );
    create_marathon!(&app, serde_json::json!({ "title": "Open B", "endRegDate": "2099-06-30" }));

    let req = test::TestRequest::get().uri("/upcomingmarathon").to_request();
    let resp = test::call_service(&app, req).await;
    let v: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let titles: Vec<&str> =
        v.as_array().unwrap().iter().map(|m| m["title"].as_str().unwrap()).collect();
    assert_eq!(titles.len(), 2);
    assert!(!titles.contains(&"Past"));
}

#[actix_web::test]
#[serial]
async fn featured_caps_at_six() {
    setup_env();
    let app = init_app!(state(InMemRepo::new(false)));
    for n in 0..8 {
        create_marathon!(&app, serde_json::json!({ "title": format!("m{n}") }));
    }
    let req = test::TestRequest::get().uri("/featuredmarathon").to_request();
    let resp = test::call_service(&app, req).await;
    let v: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v.as_array().unwrap().len(), 6);
}

#[actix_web::test]
#[serial]
async fn sort_option_orders_listing() {
    setup_env();
    let app = init_app!(state(InMemRepo::new(false)));
    create_marathon!(&app, serde_json::json!({ "title": "c", "startRegDate": "2099-03-01" }));
    create_marathon!(&app, serde_json::json!({ "title": "a", "startRegDate": "2099-01-01" }));
    create_marathon!(&app, serde_json::json!({ "title": "b", "startRegDate": "2099-02-01" }));

    let req = test::TestRequest::get()
        .uri("/allmarathonswithoutemail?sortOption=registration")
        .to_request();
    let resp = test::call_service(&app, req).await;
    let v: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let titles: Vec<&str> =
        v.as_array().unwrap().iter().map(|m| m["title"].as_str().unwrap()).collect();
    assert_eq!(titles, ["a", "b", "c"]);

    // unrecognized option still lists everything
    let req = test::TestRequest::get()
        .uri("/allmarathonswithoutemail?sortOption=banana")
        .to_request();
    let resp = test::call_service(&app, req).await;
    let v: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v.as_array().unwrap().len(), 3);
}

#[actix_web::test]
#[serial]
async fn malformed_id_is_rejected() {
    setup_env();
    let app = init_app!(state(InMemRepo::new(false)));
    let req = test::TestRequest::get().uri("/marathons/not-a-hex-id").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}
