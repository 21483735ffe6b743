//! Throughput workloads against any store.
//!
//! Each workload draws document ids from a seeded generator, so a read workload run with
//! the same seed as a write workload touches the documents the writes produced.

use crate::client::Client;
use crate::common::{
    key::DocumentKey,
    value::{Fields, Value},
};
use crate::error::Result;
use crate::store::DocumentStore;
use crate::write::operation::SetOptions;

use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use std::{fmt, time};

/// Timing of one workload run.
#[derive(Clone, Debug, PartialEq)]
pub struct WorkloadReport {
    /// Store calls issued.
    pub operations: usize,
    /// Documents written or found.
    pub documents: usize,
    /// Wall-clock time of the whole run.
    pub elapsed: time::Duration,
}

impl WorkloadReport {
    /// Average time per document, zero when no document was touched.
    pub fn per_document(&self) -> time::Duration {
        match u32::try_from(self.documents) {
            Ok(0) | Err(_) => time::Duration::ZERO,
            Ok(documents) => self.elapsed / documents,
        }
    }
}

impl fmt::Display for WorkloadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} documents in {} operations, total {:?}, {:?}/doc",
            self.documents,
            self.operations,
            self.elapsed,
            self.per_document()
        )
    }
}

fn random_id(rng: &mut StdRng) -> String {
    rng.gen_range(0..i64::MAX).to_string()
}

fn stamped(template: &Fields, id_field: &str, id: &str) -> Fields {
    let mut fields = template.clone();
    fields.insert(id_field.to_string(), Value::from(id));
    fields
}

fn finish(report: WorkloadReport) -> WorkloadReport {
    #[cfg(feature = "tracing")]
    tracing::info!(%report, "workload finished");
    report
}

/// Batches of overwriting sets with random ids.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct BatchedWrites {
    /// Target collection.
    pub collection: String,
    /// Number of batches committed.
    pub batches: usize,
    /// Writes per batch.
    pub batch_size: usize,
    /// Fields written to every document.
    pub template: Fields,
    /// Field that receives the document id.
    pub id_field: String,
    /// Id generator seed.
    pub seed: u64,
}

impl Default for BatchedWrites {
    fn default() -> Self {
        Self {
            collection: "sample".to_string(),
            batches: 100,
            batch_size: 200,
            template: Fields::new(),
            id_field: "property_id".to_string(),
            seed: 1,
        }
    }
}

impl BatchedWrites {
    /// Commit every batch in turn; the first failing batch aborts the run.
    ///
    /// A batch larger than the store's commit limit is split into several commits.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "document_crud.workload.batched_writes", skip_all, err)
    )]
    pub async fn run<S: DocumentStore>(&self, client: &Client<S>) -> Result<WorkloadReport> {
        let limit = client.store().max_commit_writes().max(1);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let start = time::Instant::now();
        let mut operations = 0;
        let mut documents = 0;
        for _ in 0..self.batches {
            let mut remaining = self.batch_size;
            while remaining > 0 {
                let size = remaining.min(limit);
                let mut batch = client.batch();
                for _ in 0..size {
                    let id = random_id(&mut rng);
                    let fields = stamped(&self.template, &self.id_field, &id);
                    batch.set(
                        DocumentKey::new(self.collection.as_str(), id),
                        fields,
                        SetOptions::Overwrite,
                    );
                }
                documents += batch.commit().await?.len();
                operations += 1;
                remaining -= size;
            }
        }
        Ok(finish(WorkloadReport {
            operations,
            documents,
            elapsed: start.elapsed(),
        }))
    }
}

/// One create per document, issued sequentially.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct SequentialCreates {
    /// Target collection.
    pub collection: String,
    /// Documents created.
    pub documents: usize,
    /// Fields written to every document.
    pub template: Fields,
    /// Field that receives the document id.
    pub id_field: String,
    /// Id generator seed.
    pub seed: u64,
}

impl Default for SequentialCreates {
    fn default() -> Self {
        Self {
            collection: "sample".to_string(),
            documents: 20_000,
            template: Fields::new(),
            id_field: "property_id".to_string(),
            seed: 1,
        }
    }
}

impl SequentialCreates {
    /// Create every document in turn; the first failing create aborts the run.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "document_crud.workload.sequential_creates", skip_all, err)
    )]
    pub async fn run<S: DocumentStore>(&self, client: &Client<S>) -> Result<WorkloadReport> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let start = time::Instant::now();
        for _ in 0..self.documents {
            let id = random_id(&mut rng);
            let fields = stamped(&self.template, &self.id_field, &id);
            client
                .create(&DocumentKey::new(self.collection.as_str(), id), fields)
                .await?;
        }
        Ok(finish(WorkloadReport {
            operations: self.documents,
            documents: self.documents,
            elapsed: start.elapsed(),
        }))
    }
}

/// Rounds of multi-document reads over random ids.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct BulkReads {
    /// Source collection.
    pub collection: String,
    /// Number of `get_all` calls.
    pub rounds: usize,
    /// Keys requested per call.
    pub keys_per_round: usize,
    /// Id generator seed.
    pub seed: u64,
}

impl Default for BulkReads {
    fn default() -> Self {
        Self {
            collection: "sample".to_string(),
            rounds: 2_000,
            keys_per_round: 10,
            seed: 1,
        }
    }
}

impl BulkReads {
    /// Issue every round; `documents` in the report counts the documents found.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "document_crud.workload.bulk_reads", skip_all, err)
    )]
    pub async fn run<S: DocumentStore>(&self, client: &Client<S>) -> Result<WorkloadReport> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let start = time::Instant::now();
        let mut documents = 0;
        for _ in 0..self.rounds {
            let keys: Vec<_> = (0..self.keys_per_round)
                .map(|_| DocumentKey::new(self.collection.as_str(), random_id(&mut rng)))
                .collect();
            documents += client.get_all(&keys).await?.iter().flatten().count();
        }
        Ok(finish(WorkloadReport {
            operations: self.rounds,
            documents,
            elapsed: start.elapsed(),
        }))
    }
}
