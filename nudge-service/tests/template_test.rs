mod common;

use common::{json_body, TestApp};
use serde_json::json;

#[tokio::test]
async fn update_revert_and_preview_a_tone_variant() {
    let app = TestApp::spawn().await;
    let invoice_id = app.create_draft("standard", "2024-06-30").await;
    let base = format!("/api/invoices/{}/templates/reminder1", invoice_id);

    let original_friendly = app.invoice(&invoice_id).await["templates"][1]["toneVariants"]["friendly"]
        .clone();

    let response = app
        .put(
            &base,
            json!({ "tone": "firm", "subject": "Pay {{amount}}", "body": "Hi {{clientFirstName}}" }),
        )
        .await;
    assert!(response.status().is_success());
    let template = json_body(response).await["template"].clone();
    assert_eq!(template["tone"], "firm");
    assert_eq!(template["subject"], "Pay {{amount}}");
    assert_eq!(template["toneVariants"]["firm"]["isCustomized"], true);
    assert_eq!(template["toneVariants"]["friendly"], original_friendly);

    let preview = json_body(app.get(&format!("{}/preview", base)).await).await;
    assert_eq!(preview["tone"], "firm");
    assert_eq!(preview["subject"], "Pay $1,250.00");
    assert_eq!(preview["body"], "Hi Ada");
    assert!(preview["html"].as_str().unwrap().contains("Pay invoice"));

    let preview = json_body(app.get(&format!("{}/preview?tone=friendly", base)).await).await;
    assert_eq!(preview["tone"], "friendly");
    assert_ne!(preview["subject"], "Pay $1,250.00");

    let response = app
        .post(&format!("{}/revert", base), json!({ "tone": "firm" }))
        .await;
    assert!(response.status().is_success());
    let template = json_body(response).await["template"].clone();
    assert_eq!(template["tone"], "firm");
    assert_ne!(template["subject"], "Pay {{amount}}");
    assert_eq!(template["toneVariants"]["firm"]["isCustomized"], false);
    assert_eq!(template["subject"], template["toneVariants"]["firm"]["subject"]);
}

#[tokio::test]
async fn template_routes_reject_unknown_inputs() {
    let app = TestApp::spawn().await;
    let invoice_id = app.create_draft("light", "2024-06-30").await;

    let response = app
        .put(
            &format!("/api/invoices/{}/templates/reminder3", invoice_id),
            json!({ "tone": "firm", "subject": "S", "body": "B" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 404);

    let response = app
        .put(
            &format!("/api/invoices/{}/templates/reminder1", invoice_id),
            json!({ "tone": "snarky", "subject": "S", "body": "B" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 400);

    let response = app
        .put(
            &format!("/api/invoices/{}/templates/reminder1", invoice_id),
            json!({ "tone": "firm", "subject": "", "body": "B" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 422);
}

#[tokio::test]
async fn preview_without_client_leaves_names_blank() {
    let app = TestApp::spawn().await;
    let response = app
        .post("/api/invoices", json!({ "amountCents": 4200, "dueDate": "2024-06-30" }))
        .await;
    let invoice_id = json_body(response).await["invoice"]["invoiceId"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .put(
            &format!("/api/invoices/{}/templates/initial", invoice_id),
            json!({ "tone": "friendly", "subject": "For {{clientName}}", "body": "Due {{dueDate}}" }),
        )
        .await;
    assert!(response.status().is_success());

    let preview = json_body(
        app.get(&format!("/api/invoices/{}/templates/initial/preview", invoice_id))
            .await,
    )
    .await;
    assert_eq!(preview["subject"], "For ");
    assert_eq!(preview["body"], "Due June 30, 2024");
}
