use super::NudgeStore;
use crate::models::datetime::to_stored;
use crate::models::{Client, EmailFlow, Invoice, InvoiceStatus, ReminderRecord, Workspace};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{self, doc, Document},
    options::{FindOptions, IndexOptions, ReplaceOptions},
    Client as MongoClient, Collection, Database, IndexModel,
};
use serde::de::DeserializeOwned;
use service_core::error::AppError;

/// Optional invoice fields that a whole-document write must clear when the
/// new value is absent. `remindersAbandonedAt` is never cleared.
const CLEARABLE_INVOICE_FIELDS: [&str; 9] = [
    "clientId",
    "amountCents",
    "dueDate",
    "paymentLink",
    "templates",
    "sentAt",
    "lastEmailErrorMessage",
    "lastEmailErrorAt",
    "lastEmailErrorContext",
];

fn db_error(action: &'static str) -> impl Fn(mongodb::error::Error) -> AppError {
    move |e| {
        tracing::error!(error = %e, "Failed to {}", action);
        AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Document, AppError> {
    bson::to_document(value)
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to encode document: {}", e)))
}

#[derive(Clone)]
pub struct MongoStore {
    client: MongoClient,
    db: Database,
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, AppError> {
        tracing::info!("Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri).await.map_err(|e| {
            tracing::error!("Failed to connect to MongoDB: {}", e);
            AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
        })?;
        let db = client.database(database);
        tracing::info!(database = %database, "Successfully connected to MongoDB database");
        Ok(Self { client, db })
    }

    pub async fn initialize_indexes(&self) -> Result<(), AppError> {
        tracing::info!("Creating MongoDB indexes for nudge-service");

        create_index(&self.invoices(), doc! { "invoiceId": 1 }, "invoice_id_idx", true).await?;
        create_index(&self.invoices(), doc! { "userId": 1 }, "user_id_idx", false).await?;
        create_index(&self.invoices(), doc! { "status": 1 }, "status_idx", false).await?;

        create_index(&self.clients(), doc! { "clientId": 1 }, "client_id_idx", true).await?;
        create_index(&self.clients(), doc! { "userId": 1 }, "user_id_idx", false).await?;

        create_index(&self.workspaces(), doc! { "userId": 1 }, "user_id_idx", true).await?;

        create_index(&self.flows(), doc! { "flowId": 1 }, "flow_id_idx", true).await?;
        create_index(&self.flows(), doc! { "userId": 1 }, "user_id_idx", false).await?;

        tracing::info!("Successfully created all MongoDB indexes");
        Ok(())
    }

    fn invoices(&self) -> Collection<Invoice> {
        self.db.collection("invoices")
    }

    fn clients(&self) -> Collection<Client> {
        self.db.collection("clients")
    }

    fn workspaces(&self) -> Collection<Workspace> {
        self.db.collection("workspaces")
    }

    fn flows(&self) -> Collection<EmailFlow> {
        self.db.collection("flows")
    }
}

async fn create_index<T: Send + Sync>(
    collection: &Collection<T>,
    keys: Document,
    name: &str,
    unique: bool,
) -> Result<(), AppError> {
    let model = IndexModel::builder()
        .keys(keys)
        .options(
            IndexOptions::builder()
                .name(name.to_string())
                .unique(unique)
                .build(),
        )
        .build();

    collection.create_index(model, None).await.map_err(|e| {
        tracing::error!(collection = %collection.name(), index = %name, "Failed to create index: {}", e);
        AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
    })?;
    Ok(())
}

async fn find_many<T>(
    collection: &Collection<T>,
    filter: Document,
    action: &'static str,
) -> Result<Vec<T>, AppError>
where
    T: DeserializeOwned + Unpin + Send + Sync,
{
    let options = FindOptions::builder().sort(doc! { "createdAt": -1 }).build();
    let cursor = collection
        .find(filter, options)
        .await
        .map_err(db_error(action))?;
    cursor.try_collect().await.map_err(db_error(action))
}

#[async_trait]
impl NudgeStore for MongoStore {
    async fn health_check(&self) -> Result<(), AppError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(db_error("ping MongoDB"))?;
        Ok(())
    }

    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), AppError> {
        self.invoices()
            .insert_one(invoice, None)
            .await
            .map_err(db_error("insert invoice"))?;
        Ok(())
    }

    async fn find_invoice(&self, invoice_id: &str) -> Result<Option<Invoice>, AppError> {
        self.invoices()
            .find_one(doc! { "invoiceId": invoice_id }, None)
            .await
            .map_err(db_error("find invoice"))
    }

    async fn find_invoice_for_user(
        &self,
        user_id: &str,
        invoice_id: &str,
    ) -> Result<Option<Invoice>, AppError> {
        self.invoices()
            .find_one(doc! { "invoiceId": invoice_id, "userId": user_id }, None)
            .await
            .map_err(db_error("find invoice"))
    }

    async fn list_invoices_for_user(&self, user_id: &str) -> Result<Vec<Invoice>, AppError> {
        find_many(&self.invoices(), doc! { "userId": user_id }, "list invoices").await
    }

    async fn list_reminder_candidates(&self) -> Result<Vec<String>, AppError> {
        let options = FindOptions::builder()
            .projection(doc! { "_id": 0, "invoiceId": 1 })
            .sort(doc! { "createdAt": -1 })
            .build();
        let ids: Vec<Document> = self
            .db
            .collection::<Document>("invoices")
            .find(doc! { "status": { "$in": ["sent", "overdue"] } }, options)
            .await
            .map_err(db_error("list reminder candidates"))?
            .try_collect()
            .await
            .map_err(db_error("list reminder candidates"))?;

        Ok(ids
            .iter()
            .filter_map(|doc| match doc.get_str("invoiceId") {
                Ok(id) => Some(id.to_string()),
                Err(_) => {
                    tracing::warn!("Skipping reminder candidate without a string invoiceId");
                    None
                }
            })
            .collect())
    }

    async fn replace_invoice(&self, invoice: &Invoice) -> Result<(), AppError> {
        let mut set = encode(invoice)?;
        set.remove("remindersSent");
        set.remove("remindersAbandonedAt");

        let unset: Document = CLEARABLE_INVOICE_FIELDS
            .iter()
            .filter(|field| !set.contains_key(**field))
            .map(|field| (field.to_string(), bson::Bson::String(String::new())))
            .collect();

        let mut update = doc! { "$set": set };
        if !unset.is_empty() {
            update.insert("$unset", unset);
        }

        self.invoices()
            .update_one(doc! { "invoiceId": &invoice.invoice_id }, update, None)
            .await
            .map_err(db_error("update invoice"))?;
        Ok(())
    }

    async fn append_reminder_if_absent(
        &self,
        invoice_id: &str,
        record: &ReminderRecord,
    ) -> Result<bool, AppError> {
        let slot = record.slot_id.as_str();
        // Matches the tagged shape and both legacy shapes of a scheduled entry.
        let filter = doc! {
            "invoiceId": invoice_id,
            "$nor": [
                { "remindersSent": { "$elemMatch": { "kind": "scheduled", "slotId": slot } } },
                { "remindersSent": { "$elemMatch": { "id": slot, "type": { "$ne": "manual-resend" } } } },
                { "remindersSent": slot },
            ],
        };
        let entry = encode(record)?;
        let update = doc! {
            "$push": { "remindersSent": entry },
            "$set": { "updatedAt": to_stored(Utc::now()) },
        };

        let result = self
            .invoices()
            .update_one(filter, update, None)
            .await
            .map_err(db_error("append reminder"))?;
        Ok(result.modified_count > 0)
    }

    async fn push_reminder(&self, invoice_id: &str, record: &ReminderRecord) -> Result<(), AppError> {
        let entry = encode(record)?;
        let update = doc! {
            "$push": { "remindersSent": entry },
            "$set": { "updatedAt": to_stored(Utc::now()) },
        };
        self.invoices()
            .update_one(doc! { "invoiceId": invoice_id }, update, None)
            .await
            .map_err(db_error("push reminder"))?;
        Ok(())
    }

    async fn record_email_error(
        &self,
        invoice_id: &str,
        message: &str,
        context: &str,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let update = doc! {
            "$set": {
                "lastEmailErrorMessage": message,
                "lastEmailErrorAt": to_stored(at),
                "lastEmailErrorContext": context,
                "updatedAt": to_stored(at),
            }
        };
        self.invoices()
            .update_one(doc! { "invoiceId": invoice_id }, update, None)
            .await
            .map_err(db_error("record email error"))?;
        Ok(())
    }

    async fn mark_abandoned(&self, invoice_id: &str, at: DateTime<Utc>) -> Result<bool, AppError> {
        let result = self
            .invoices()
            .update_one(
                doc! { "invoiceId": invoice_id, "remindersAbandonedAt": null },
                doc! { "$set": { "remindersAbandonedAt": to_stored(at), "updatedAt": to_stored(at) } },
                None,
            )
            .await
            .map_err(db_error("mark invoice abandoned"))?;
        Ok(result.modified_count > 0)
    }

    async fn update_status(
        &self,
        invoice_id: &str,
        status: InvoiceStatus,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.invoices()
            .update_one(
                doc! { "invoiceId": invoice_id },
                doc! { "$set": { "status": status.as_str(), "updatedAt": to_stored(at) } },
                None,
            )
            .await
            .map_err(db_error("update invoice status"))?;
        Ok(())
    }

    async fn insert_client(&self, client: &Client) -> Result<(), AppError> {
        self.clients()
            .insert_one(client, None)
            .await
            .map_err(db_error("insert client"))?;
        Ok(())
    }

    async fn find_client(&self, user_id: &str, client_id: &str) -> Result<Option<Client>, AppError> {
        self.clients()
            .find_one(doc! { "clientId": client_id, "userId": user_id }, None)
            .await
            .map_err(db_error("find client"))
    }

    async fn list_clients(&self, user_id: &str) -> Result<Vec<Client>, AppError> {
        find_many(&self.clients(), doc! { "userId": user_id }, "list clients").await
    }

    async fn find_workspace(&self, user_id: &str) -> Result<Option<Workspace>, AppError> {
        self.workspaces()
            .find_one(doc! { "userId": user_id }, None)
            .await
            .map_err(db_error("find workspace"))
    }

    async fn upsert_workspace(&self, workspace: &Workspace) -> Result<(), AppError> {
        let options = ReplaceOptions::builder().upsert(true).build();
        self.workspaces()
            .replace_one(doc! { "userId": &workspace.user_id }, workspace, options)
            .await
            .map_err(db_error("upsert workspace"))?;
        Ok(())
    }

    async fn insert_flow(&self, flow: &EmailFlow) -> Result<(), AppError> {
        self.flows()
            .insert_one(flow, None)
            .await
            .map_err(db_error("insert flow"))?;
        Ok(())
    }

    async fn find_flow(&self, user_id: &str, flow_id: &str) -> Result<Option<EmailFlow>, AppError> {
        self.flows()
            .find_one(doc! { "flowId": flow_id, "userId": user_id }, None)
            .await
            .map_err(db_error("find flow"))
    }

    async fn list_flows(&self, user_id: &str) -> Result<Vec<EmailFlow>, AppError> {
        find_many(&self.flows(), doc! { "userId": user_id }, "list flows").await
    }

    async fn delete_flow(&self, user_id: &str, flow_id: &str) -> Result<bool, AppError> {
        let result = self
            .flows()
            .delete_one(doc! { "flowId": flow_id, "userId": user_id }, None)
            .await
            .map_err(db_error("delete flow"))?;
        Ok(result.deleted_count > 0)
    }
}
