use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("store error: {0}")]
    Backend(String),
}

impl From<mongodb::error::Error> for RepoError {
    fn from(e: mongodb::error::Error) -> Self {
        RepoError::Backend(e.to_string())
    }
}

impl From<mongodb::bson::ser::Error> for RepoError {
    fn from(e: mongodb::bson::ser::Error) -> Self {
        RepoError::Backend(e.to_string())
    }
}

impl From<mongodb::bson::de::Error> for RepoError {
    fn from(e: mongodb::bson::de::Error) -> Self {
        RepoError::Backend(e.to_string())
    }
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait MarathonRepo: Send + Sync {
    async fn list_marathons(
        &self,
        created_by: Option<&str>,
        sort: Option<MarathonSort>,
    ) -> RepoResult<Vec<Marathon>>;
    /// Random subset of at most `size` marathons.
    async fn sample_marathons(&self, size: usize) -> RepoResult<Vec<Marathon>>;
    /// Random subset restricted to marathons whose `endRegDate`, compared as a
    /// date and not a string, is strictly after `now`.
    async fn sample_upcoming_marathons(
        &self,
        size: usize,
        now: DateTime<Utc>,
    ) -> RepoResult<Vec<Marathon>>;
    async fn get_marathon(&self, id: ObjectId) -> RepoResult<Option<Marathon>>;
    async fn insert_marathon(&self, marathon: Marathon) -> RepoResult<InsertOutcome>;
    /// Upsert-replace: a missing id creates the record under that id, so the
    /// caller always ends up with a document matching their payload.
    async fn replace_marathon(&self, id: ObjectId, marathon: Marathon) -> RepoResult<UpdateOutcome>;
    /// Atomic single-document `regCount` adjustment. When the repo was built
    /// with the zero floor enabled, a decrement at (or below) zero matches
    /// nothing instead of going negative.
    async fn adjust_reg_count(&self, id: ObjectId, delta: i64) -> RepoResult<UpdateOutcome>;
    async fn delete_marathon(&self, id: ObjectId) -> RepoResult<DeleteOutcome>;
}

#[async_trait]
pub trait RegistrationRepo: Send + Sync {
    async fn get_registration(&self, id: ObjectId) -> RepoResult<Option<Registration>>;
    async fn insert_registration(&self, registration: Registration) -> RepoResult<InsertOutcome>;
    async fn replace_registration(
        &self,
        id: ObjectId,
        registration: Registration,
    ) -> RepoResult<UpdateOutcome>;
    async fn delete_registration(&self, id: ObjectId) -> RepoResult<DeleteOutcome>;
    /// A caller's registrations in store ("natural") order, optionally only
    /// the paid ones.
    async fn registrations_for_email(
        &self,
        email: &str,
        paid_only: bool,
    ) -> RepoResult<Vec<Registration>>;
    /// Flip the registration matching `tran_id` from `pending` to `paid` and
    /// return it. Unknown or already-paid transaction ids return `None`; the
    /// pending-state filter is what makes the callback idempotent.
    async fn mark_paid(&self, tran_id: &str) -> RepoResult<Option<Registration>>;
}

pub trait Repo: MarathonRepo + RegistrationRepo {}

impl<T> Repo for T where T: MarathonRepo + RegistrationRepo {}

pub mod inmem {
    use super::*;
    use chrono::NaiveDate;
    use rand::seq::SliceRandom;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, RwLock};

    const SNAPSHOT_FILE: &str = "state.json";

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        marathons: HashMap<String, Marathon>,
        registrations: HashMap<String, Registration>,
        // stands in for the store's natural order: insertion order
        registration_order: Vec<String>,
    }

    /// Development/test backend. Holds both collections behind one lock and
    /// optionally snapshots them to `PACEPULSE_DATA_DIR/state.json` so a dev
    /// server survives restarts.
    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Option<Arc<PathBuf>>,
        clamp_at_zero: bool,
    }

    impl InMemRepo {
        pub fn new(clamp_at_zero: bool) -> Self {
            let snapshot_path = std::env::var("PACEPULSE_DATA_DIR")
                .map(|dir| PathBuf::from(dir).join(SNAPSHOT_FILE))
                .ok();
            let state = match &snapshot_path {
                Some(p) => Self::load_state_from(p),
                None => State::default(),
            };
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: snapshot_path.map(Arc::new),
                clamp_at_zero,
            }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => s,
                    Err(e) => {
                        log::warn!("failed to parse snapshot '{}': {e}, starting empty", path.display());
                        State::default()
                    }
                },
                Err(_) => State::default(),
            }
        }

        fn persist(&self) {
            let Some(path) = &self.snapshot_path else { return };
            if let Ok(bytes) = serde_json::to_vec_pretty(&*self.state.read().unwrap()) {
                if let Some(dir) = path.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                if let Err(e) = std::fs::write(path.as_ref(), bytes) {
                    log::warn!("failed to write snapshot '{}': {e}", path.display());
                }
            }
        }

        fn parse_as_date(raw: &str) -> Option<DateTime<Utc>> {
            if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
                return Some(dt.with_timezone(&Utc));
            }
            let d = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
            Some(DateTime::from_naive_utc_and_offset(d.and_hms_opt(0, 0, 0)?, Utc))
        }
    }

    #[async_trait]
    impl MarathonRepo for InMemRepo {
        async fn list_marathons(
            &self,
            created_by: Option<&str>,
            sort: Option<MarathonSort>,
        ) -> RepoResult<Vec<Marathon>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<Marathon> = s
                .marathons
                .values()
                .filter(|m| created_by.map_or(true, |email| m.created_by.as_deref() == Some(email)))
                .cloned()
                .collect();
            match sort {
                Some(MarathonSort::RegistrationStart) => {
                    v.sort_by(|a, b| a.start_reg_date.cmp(&b.start_reg_date));
                }
                Some(MarathonSort::MarathonStart) => {
                    v.sort_by(|a, b| a.marathon_start_date.cmp(&b.marathon_start_date));
                }
                None => {}
            }
            Ok(v)
        }

        async fn sample_marathons(&self, size: usize) -> RepoResult<Vec<Marathon>> {
            let s = self.state.read().unwrap();
            let all: Vec<Marathon> = s.marathons.values().cloned().collect();
            let mut rng = rand::thread_rng();
            Ok(all.choose_multiple(&mut rng, size).cloned().collect())
        }

        async fn sample_upcoming_marathons(
            &self,
            size: usize,
            now: DateTime<Utc>,
        ) -> RepoResult<Vec<Marathon>> {
            let s = self.state.read().unwrap();
            let open: Vec<Marathon> = s
                .marathons
                .values()
                .filter(|m| {
                    m.end_reg_date
                        .as_deref()
                        .and_then(Self::parse_as_date)
                        .map_or(false, |end| end > now)
                })
                .cloned()
                .collect();
            let mut rng = rand::thread_rng();
            Ok(open.choose_multiple(&mut rng, size).cloned().collect())
        }

        async fn get_marathon(&self, id: ObjectId) -> RepoResult<Option<Marathon>> {
            let s = self.state.read().unwrap();
            Ok(s.marathons.get(&id.to_hex()).cloned())
        }

        async fn insert_marathon(&self, mut marathon: Marathon) -> RepoResult<InsertOutcome> {
            let id = marathon.id.unwrap_or_else(ObjectId::new);
            marathon.id = Some(id);
            let mut s = self.state.write().unwrap();
            s.marathons.insert(id.to_hex(), marathon);
            drop(s);
            self.persist();
            Ok(InsertOutcome { inserted_id: id.to_hex() })
        }

        async fn replace_marathon(
            &self,
            id: ObjectId,
            mut marathon: Marathon,
        ) -> RepoResult<UpdateOutcome> {
            marathon.id = Some(id);
            let mut s = self.state.write().unwrap();
            let existed = s.marathons.insert(id.to_hex(), marathon).is_some();
            drop(s);
            self.persist();
            Ok(UpdateOutcome {
                matched_count: existed as u64,
                modified_count: existed as u64,
                upserted_id: (!existed).then(|| id.to_hex()),
            })
        }

        async fn adjust_reg_count(&self, id: ObjectId, delta: i64) -> RepoResult<UpdateOutcome> {
            let mut s = self.state.write().unwrap();
            let Some(m) = s.marathons.get_mut(&id.to_hex()) else {
                return Ok(UpdateOutcome { matched_count: 0, modified_count: 0, upserted_id: None });
            };
            let current = m.reg_count.unwrap_or(0);
            if self.clamp_at_zero && delta < 0 && current <= 0 {
                // mirrors the mongo filter `regCount > 0`: nothing matches
                return Ok(UpdateOutcome { matched_count: 0, modified_count: 0, upserted_id: None });
            }
            m.reg_count = Some(current + delta);
            drop(s);
            self.persist();
            Ok(UpdateOutcome { matched_count: 1, modified_count: 1, upserted_id: None })
        }

        async fn delete_marathon(&self, id: ObjectId) -> RepoResult<DeleteOutcome> {
            let mut s = self.state.write().unwrap();
            let removed = s.marathons.remove(&id.to_hex()).is_some();
            drop(s);
            self.persist();
            Ok(DeleteOutcome { deleted_count: removed as u64 })
        }
    }

    #[async_trait]
    impl RegistrationRepo for InMemRepo {
        async fn get_registration(&self, id: ObjectId) -> RepoResult<Option<Registration>> {
            let s = self.state.read().unwrap();
            Ok(s.registrations.get(&id.to_hex()).cloned())
        }

        async fn insert_registration(
            &self,
            mut registration: Registration,
        ) -> RepoResult<InsertOutcome> {
            let id = registration.id.unwrap_or_else(ObjectId::new);
            registration.id = Some(id);
            let mut s = self.state.write().unwrap();
            s.registrations.insert(id.to_hex(), registration);
            s.registration_order.push(id.to_hex());
            drop(s);
            self.persist();
            Ok(InsertOutcome { inserted_id: id.to_hex() })
        }

        async fn replace_registration(
            &self,
            id: ObjectId,
            mut registration: Registration,
        ) -> RepoResult<UpdateOutcome> {
            registration.id = Some(id);
            let mut s = self.state.write().unwrap();
            let existed = s.registrations.insert(id.to_hex(), registration).is_some();
            if !existed {
                s.registration_order.push(id.to_hex());
            }
            drop(s);
            self.persist();
            Ok(UpdateOutcome {
                matched_count: existed as u64,
                modified_count: existed as u64,
                upserted_id: (!existed).then(|| id.to_hex()),
            })
        }

        async fn delete_registration(&self, id: ObjectId) -> RepoResult<DeleteOutcome> {
            let mut s = self.state.write().unwrap();
            let removed = s.registrations.remove(&id.to_hex()).is_some();
            if removed {
                let hex = id.to_hex();
                s.registration_order.retain(|k| k != &hex);
            }
            drop(s);
            self.persist();
            Ok(DeleteOutcome { deleted_count: removed as u64 })
        }

        async fn registrations_for_email(
            &self,
            email: &str,
            paid_only: bool,
        ) -> RepoResult<Vec<Registration>> {
            let s = self.state.read().unwrap();
            let mut out = Vec::new();
            for key in &s.registration_order {
                let Some(r) = s.registrations.get(key) else { continue };
                if r.user_email.as_deref() != Some(email) {
                    continue;
                }
                if paid_only && r.status != Some(RegistrationStatus::Paid) {
                    continue;
                }
                out.push(r.clone());
            }
            Ok(out)
        }

        async fn mark_paid(&self, tran_id: &str) -> RepoResult<Option<Registration>> {
            let mut s = self.state.write().unwrap();
            let hit = s.registrations.values_mut().find(|r| {
                r.tran_id.as_deref() == Some(tran_id)
                    && r.status == Some(RegistrationStatus::Pending)
            });
            let Some(r) = hit else { return Ok(None) };
            r.status = Some(RegistrationStatus::Paid);
            let updated = r.clone();
            drop(s);
            self.persist();
            Ok(Some(updated))
        }
    }
}

pub mod mongo {
    use super::*;
    use futures_util::TryStreamExt;
    use mongodb::bson::{doc, Bson};
    use mongodb::options::{FindOneAndUpdateOptions, FindOptions, ReplaceOptions, ReturnDocument};
    use mongodb::{Client, Collection};

    const MARATHON_COLLECTION: &str = "marathons";
    // singular, kept from the live deployment's data
    const REGISTRATION_COLLECTION: &str = "registration";

    #[derive(Clone)]
    pub struct MongoRepo {
        marathons: Collection<Marathon>,
        registrations: Collection<Registration>,
        clamp_at_zero: bool,
    }

    impl MongoRepo {
        pub async fn connect(uri: &str, db_name: &str, clamp_at_zero: bool) -> RepoResult<Self> {
            let client = Client::with_uri_str(uri).await?;
            let db = client.database(db_name);
            Ok(Self {
                marathons: db.collection(MARATHON_COLLECTION),
                registrations: db.collection(REGISTRATION_COLLECTION),
                clamp_at_zero,
            })
        }
    }

    #[async_trait]
    impl MarathonRepo for MongoRepo {
        async fn list_marathons(
            &self,
            created_by: Option<&str>,
            sort: Option<MarathonSort>,
        ) -> RepoResult<Vec<Marathon>> {
            let filter = match created_by {
                Some(email) => doc! { "createdBy": email },
                None => doc! {},
            };
            let cursor = match sort {
                Some(MarathonSort::RegistrationStart) => {
                    let opts = FindOptions::builder().sort(doc! { "startRegDate": 1 }).build();
                    self.marathons.find(filter, opts).await?
                }
                Some(MarathonSort::MarathonStart) => {
                    let opts = FindOptions::builder().sort(doc! { "marathonStartDate": 1 }).build();
                    self.marathons.find(filter, opts).await?
                }
                None => self.marathons.find(filter, None).await?,
            };
            Ok(cursor.try_collect().await?)
        }

        async fn sample_marathons(&self, size: usize) -> RepoResult<Vec<Marathon>> {
            let pipeline = [doc! { "$sample": { "size": size as i64 } }];
            let mut cursor = self.marathons.aggregate(pipeline, None).await?;
            let mut out = Vec::new();
            while let Some(d) = cursor.try_next().await? {
                out.push(mongodb::bson::from_document(d)?);
            }
            Ok(out)
        }

        async fn sample_upcoming_marathons(
            &self,
            size: usize,
            now: DateTime<Utc>,
        ) -> RepoResult<Vec<Marathon>> {
            // endRegDate is stored as a string; compare it as a date
            let pipeline = [
                doc! {
                    "$match": {
                        "$expr": {
                            "$gt": [
                                { "$toDate": "$endRegDate" },
                                Bson::DateTime(mongodb::bson::DateTime::from_chrono(now)),
                            ]
                        }
                    }
                },
                doc! { "$sample": { "size": size as i64 } },
            ];
            let mut cursor = self.marathons.aggregate(pipeline, None).await?;
            let mut out = Vec::new();
            while let Some(d) = cursor.try_next().await? {
                out.push(mongodb::bson::from_document(d)?);
            }
            Ok(out)
        }

        async fn get_marathon(&self, id: ObjectId) -> RepoResult<Option<Marathon>> {
            Ok(self.marathons.find_one(doc! { "_id": id }, None).await?)
        }

        async fn insert_marathon(&self, marathon: Marathon) -> RepoResult<InsertOutcome> {
            let res = self.marathons.insert_one(&marathon, None).await?;
            Ok(InsertOutcome { inserted_id: hex_id(&res.inserted_id) })
        }

        async fn replace_marathon(
            &self,
            id: ObjectId,
            mut marathon: Marathon,
        ) -> RepoResult<UpdateOutcome> {
            marathon.id = None; // the replacement document must not carry _id
            let opts = ReplaceOptions::builder().upsert(true).build();
            let res = self
                .marathons
                .replace_one(doc! { "_id": id }, &marathon, opts)
                .await?;
            Ok(update_outcome(res))
        }

        async fn adjust_reg_count(&self, id: ObjectId, delta: i64) -> RepoResult<UpdateOutcome> {
            let filter = if self.clamp_at_zero && delta < 0 {
                doc! { "_id": id, "regCount": { "$gt": 0 } }
            } else {
                doc! { "_id": id }
            };
            let res = self
                .marathons
                .update_one(filter, doc! { "$inc": { "regCount": delta } }, None)
                .await?;
            Ok(update_outcome(res))
        }

        async fn delete_marathon(&self, id: ObjectId) -> RepoResult<DeleteOutcome> {
            let res = self.marathons.delete_one(doc! { "_id": id }, None).await?;
            Ok(DeleteOutcome { deleted_count: res.deleted_count })
        }
    }

    #[async_trait]
    impl RegistrationRepo for MongoRepo {
        async fn get_registration(&self, id: ObjectId) -> RepoResult<Option<Registration>> {
            Ok(self.registrations.find_one(doc! { "_id": id }, None).await?)
        }

        async fn insert_registration(
            &self,
            registration: Registration,
        ) -> RepoResult<InsertOutcome> {
            let res = self.registrations.insert_one(&registration, None).await?;
            Ok(InsertOutcome { inserted_id: hex_id(&res.inserted_id) })
        }

        async fn replace_registration(
            &self,
            id: ObjectId,
            mut registration: Registration,
        ) -> RepoResult<UpdateOutcome> {
            registration.id = None;
            let opts = ReplaceOptions::builder().upsert(true).build();
            let res = self
                .registrations
                .replace_one(doc! { "_id": id }, &registration, opts)
                .await?;
            Ok(update_outcome(res))
        }

        async fn delete_registration(&self, id: ObjectId) -> RepoResult<DeleteOutcome> {
            let res = self.registrations.delete_one(doc! { "_id": id }, None).await?;
            Ok(DeleteOutcome { deleted_count: res.deleted_count })
        }

        async fn registrations_for_email(
            &self,
            email: &str,
            paid_only: bool,
        ) -> RepoResult<Vec<Registration>> {
            let mut filter = doc! { "userEmail": email };
            if paid_only {
                filter.insert("status", "paid");
            }
            let cursor = self.registrations.find(filter, None).await?;
            Ok(cursor.try_collect().await?)
        }

        async fn mark_paid(&self, tran_id: &str) -> RepoResult<Option<Registration>> {
            let opts = FindOneAndUpdateOptions::builder()
                .return_document(ReturnDocument::After)
                .build();
            Ok(self
                .registrations
                .find_one_and_update(
                    doc! { "tranId": tran_id, "status": "pending" },
                    doc! { "$set": { "status": "paid" } },
                    opts,
                )
                .await?)
        }
    }

    fn hex_id(id: &Bson) -> String {
        id.as_object_id().map(|o| o.to_hex()).unwrap_or_else(|| id.to_string())
    }

    fn update_outcome(res: mongodb::results::UpdateResult) -> UpdateOutcome {
        UpdateOutcome {
            matched_count: res.matched_count,
            modified_count: res.modified_count,
            upserted_id: res.upserted_id.and_then(|b| b.as_object_id()).map(|o| o.to_hex()),
        }
    }
}
