mod common;

use common::{json_body, TestApp, OTHER_USER_ID};
use serde_json::json;

#[tokio::test]
async fn saved_flow_is_copied_into_another_invoice() {
    let app = TestApp::spawn().await;
    let source_id = app.create_draft("standard", "2030-01-31").await;
    app.put(
        &format!("/api/invoices/{}/templates/reminder2", source_id),
        json!({ "tone": "professional", "subject": "Custom {{amount}}", "body": "Custom body" }),
    )
    .await;

    let response = app
        .post("/api/flows", json!({ "name": "Agency", "invoiceId": source_id }))
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let flow = json_body(response).await["flow"].clone();
    assert_eq!(flow["schedule"], "standard");
    let flow_id = flow["flowId"].as_str().unwrap().to_string();

    let target_id = app.create_draft("light", "2030-01-31").await;
    let response = app
        .post(
            &format!("/api/invoices/{}/apply-flow", target_id),
            json!({ "flowId": flow_id }),
        )
        .await;
    assert!(response.status().is_success());
    let invoice = json_body(response).await["invoice"].clone();
    assert_eq!(invoice["reminderSchedule"], "standard");
    assert_eq!(invoice["templates"][2]["subject"], "Custom {{amount}}");

    // Deleting the flow leaves the copy in place.
    assert!(app.delete(&format!("/api/flows/{}", flow_id)).await.status().is_success());
    assert_eq!(app.delete(&format!("/api/flows/{}", flow_id)).await.status().as_u16(), 404);
    assert_eq!(
        app.invoice(&target_id).await["templates"][2]["subject"],
        "Custom {{amount}}"
    );
}

#[tokio::test]
async fn flows_are_listed_per_user() {
    let app = TestApp::spawn().await;
    let invoice_id = app.create_draft("standard", "2030-01-31").await;
    app.post("/api/flows", json!({ "name": "Mine", "invoiceId": invoice_id }))
        .await;

    let body = json_body(app.get("/api/flows").await).await;
    assert_eq!(body["flows"].as_array().unwrap().len(), 1);

    let response = app
        .get_as(OTHER_USER_ID, "/api/flows")
        .send()
        .await
        .unwrap();
    let body = json_body(response).await;
    assert!(body["flows"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn flow_cannot_replace_templates_after_a_reminder() {
    let app = TestApp::spawn().await;
    let source_id = app.create_draft("persistent", "2030-01-31").await;
    let flow = json_body(
        app.post("/api/flows", json!({ "name": "Strict", "invoiceId": source_id }))
            .await,
    )
    .await["flow"]
        .clone();

    let target_id = app.create_sent("standard", "2030-01-31").await;
    app.post(
        &format!("/api/invoices/{}/send-next-reminder", target_id),
        json!({}),
    )
    .await;

    let response = app
        .post(
            &format!("/api/invoices/{}/apply-flow", target_id),
            json!({ "flowId": flow["flowId"] }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 400);

    let response = app
        .post(
            &format!("/api/invoices/{}/apply-flow", target_id),
            json!({ "flowId": "nope" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 404);
}
