//! Retrieval context assembly for script generation.
//!
//! [`RetrievalContext`] borrows a [`VectorStore`] and runs the three lookups
//! a generation request needs:
//!
//! 1. A strategic, session-enriched query against all collections.
//! 2. Worked template examples (`type = example`) for the chosen template.
//! 3. Threat descriptions per focus threat (`category = <threat>`).
//!
//! [`attribution_sources`] flattens the combined result into a source list
//! for citing material in generated scripts. Rendering into prompts happens
//! downstream.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use awareness_retrieval_core::error::Result;
use awareness_retrieval_core::filter::MetadataFilter;
use awareness_retrieval_core::models::CollectionName;
use awareness_retrieval_core::search::SearchHit;

use crate::config::RetrievalConfig;
use crate::logging::truncate_for_log;
use crate::vector_store::VectorStore;

/// Audiences and threats beyond this many are left out of the enriched query.
const MAX_ENRICHMENT_ITEMS: usize = 3;

const UNKNOWN_SOURCE: &str = "Unknown source";

/// What the dialogue has established about the training session so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    #[serde(default)]
    pub facility_type: Option<String>,
    #[serde(default)]
    pub target_audience: Vec<String>,
    #[serde(default)]
    pub focus_threats: Vec<String>,
}

/// Append session details to a query so retrieval favours material that
/// fits the facility, audience, and threat focus.
pub fn enrich_query(query: &str, session: Option<&SessionContext>) -> String {
    let mut enriched = query.to_string();
    let Some(session) = session else {
        return enriched;
    };

    if let Some(facility) = session.facility_type.as_deref().filter(|f| !f.is_empty()) {
        enriched.push_str(&format!(" in {}", facility));
    }
    if !session.target_audience.is_empty() {
        enriched.push_str(&format!(" for {}", head_joined(&session.target_audience)));
    }
    if !session.focus_threats.is_empty() {
        enriched.push_str(&format!(" focusing on {}", head_joined(&session.focus_threats)));
    }
    enriched
}

fn head_joined(items: &[String]) -> String {
    items
        .iter()
        .take(MAX_ENRICHMENT_ITEMS)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalInfo {
    pub original_query: String,
    pub enriched_query: String,
    pub total_documents: usize,
    pub collection_counts: BTreeMap<CollectionName, usize>,
}

/// Result of the strategic, all-collection query.
#[derive(Debug, Clone, Serialize)]
pub struct StrategicContext {
    pub documents: BTreeMap<CollectionName, Vec<SearchHit>>,
    pub retrieval_info: RetrievalInfo,
}

/// Everything retrieved for one generation request.
#[derive(Debug, Clone, Serialize)]
pub struct CombinedContext {
    pub strategic_context: StrategicContext,
    pub template_examples: Vec<SearchHit>,
    pub threat_info: BTreeMap<String, Vec<SearchHit>>,
}

impl CombinedContext {
    pub fn total_documents(&self) -> usize {
        self.strategic_context.retrieval_info.total_documents
            + self.template_examples.len()
            + self.threat_info.values().map(Vec::len).sum::<usize>()
    }
}

/// One cited source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceAttribution {
    pub id: String,
    pub title: String,
    pub source: String,
    /// Collection name, `template_example`, or `threat_info`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    pub similarity: Option<f64>,
}

pub struct RetrievalContext<'a> {
    store: &'a VectorStore,
    limits: RetrievalConfig,
}

impl<'a> RetrievalContext<'a> {
    pub fn new(store: &'a VectorStore, limits: RetrievalConfig) -> Self {
        Self { store, limits }
    }

    /// Enrich `query` with the session and search every collection.
    pub async fn retrieve_context(
        &self,
        query: &str,
        session: Option<&SessionContext>,
    ) -> StrategicContext {
        info!(query = %truncate_for_log(query, 50), "retrieving context");
        let enriched_query = enrich_query(query, session);
        debug!(enriched_query = %enriched_query, "enriched query");

        let documents = self
            .store
            .search_all(&enriched_query, self.limits.limit_per_collection)
            .await;

        let collection_counts: BTreeMap<CollectionName, usize> =
            documents.iter().map(|(c, hits)| (*c, hits.len())).collect();
        let retrieval_info = RetrievalInfo {
            original_query: query.to_string(),
            enriched_query,
            total_documents: collection_counts.values().sum(),
            collection_counts,
        };

        StrategicContext {
            documents,
            retrieval_info,
        }
    }

    /// Worked examples for a template, optionally narrowed to one threat.
    pub async fn retrieve_template_examples(
        &self,
        template_id: &str,
        threat_type: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        let mut query = format!("template example for {}", template_id);
        if let Some(threat) = threat_type.filter(|t| !t.is_empty()) {
            query.push(' ');
            query.push_str(threat);
        }

        let filter = MetadataFilter::new().with_field("type", "example");
        self.store
            .search(
                CollectionName::Templates.as_str(),
                &query,
                Some(&filter),
                Some(self.limits.template_example_limit),
            )
            .await
    }

    /// Threat descriptions per threat type, restricted to documents whose
    /// `category` is that type.
    pub async fn retrieve_threat_info(
        &self,
        threat_types: &[String],
    ) -> Result<BTreeMap<String, Vec<SearchHit>>> {
        let mut info = BTreeMap::new();
        for threat_type in threat_types {
            let filter = (!threat_type.is_empty())
                .then(|| MetadataFilter::new().with_field("category", threat_type.as_str()));
            let hits = self
                .store
                .search(
                    CollectionName::Threats.as_str(),
                    threat_type,
                    filter.as_ref(),
                    Some(self.limits.threat_info_limit),
                )
                .await?;
            info.insert(threat_type.clone(), hits);
        }
        Ok(info)
    }

    /// Run all three lookups for a generation request.
    pub async fn gather(
        &self,
        query: &str,
        session: Option<&SessionContext>,
        template_id: Option<&str>,
    ) -> Result<CombinedContext> {
        let strategic_context = self.retrieve_context(query, session).await;

        let focus_threats: &[String] = session.map(|s| s.focus_threats.as_slice()).unwrap_or(&[]);
        let template_examples = match template_id {
            Some(id) => {
                self.retrieve_template_examples(id, focus_threats.first().map(String::as_str))
                    .await?
            }
            None => Vec::new(),
        };
        let threat_info = self.retrieve_threat_info(focus_threats).await?;

        let combined = CombinedContext {
            strategic_context,
            template_examples,
            threat_info,
        };
        info!(total = combined.total_documents(), "combined documents for context generation");
        Ok(combined)
    }
}

/// Flatten every retrieved document into citation entries.
pub fn attribution_sources(context: &CombinedContext) -> Vec<SourceAttribution> {
    let mut sources = Vec::new();

    for (collection, hits) in &context.strategic_context.documents {
        for hit in hits {
            sources.push(attribution(hit, "Untitled document", collection.as_str(), None));
        }
    }
    for hit in &context.template_examples {
        sources.push(attribution(hit, "Untitled example", "template_example", None));
    }
    for (threat_type, hits) in &context.threat_info {
        for hit in hits {
            sources.push(attribution(hit, "Untitled threat", "threat_info", Some(threat_type)));
        }
    }

    sources
}

/// CLI entry point for `awr context`.
pub async fn run_context(
    store: &VectorStore,
    limits: RetrievalConfig,
    query: &str,
    session: &SessionContext,
    template_id: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let retrieval = RetrievalContext::new(store, limits);
    let combined = retrieval.gather(query, Some(session), template_id).await?;
    let sources = attribution_sources(&combined);

    if json {
        let out = serde_json::json!({ "context": combined, "sources": sources });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let info = &combined.strategic_context.retrieval_info;
    println!("query:    {}", info.original_query);
    println!("enriched: {}", info.enriched_query);
    println!("total:    {}", combined.total_documents());
    println!();

    for (collection, hits) in &combined.strategic_context.documents {
        println!("=== {} ({}) ===", collection, hits.len());
        crate::search::print_hits(hits);
    }
    if template_id.is_some() {
        println!("=== template examples ({}) ===", combined.template_examples.len());
        crate::search::print_hits(&combined.template_examples);
    }
    for (threat, hits) in &combined.threat_info {
        println!("=== threat: {} ({}) ===", threat, hits.len());
        crate::search::print_hits(hits);
    }

    println!("--- Sources ({}) ---", sources.len());
    for s in &sources {
        let score = s
            .similarity
            .map(|v| format!("{:.2}", v))
            .unwrap_or_else(|| "-".to_string());
        println!("[{}] {} ({}, {}) {}", score, s.title, s.source, s.kind, s.id);
    }
    Ok(())
}

fn attribution(
    hit: &SearchHit,
    untitled: &str,
    kind: &str,
    subtype: Option<&String>,
) -> SourceAttribution {
    SourceAttribution {
        id: hit.id.clone(),
        title: hit
            .metadata
            .title
            .clone()
            .unwrap_or_else(|| untitled.to_string()),
        source: if hit.metadata.source.is_empty() {
            UNKNOWN_SOURCE.to_string()
        } else {
            hit.metadata.source.clone()
        },
        kind: kind.to_string(),
        subtype: subtype.cloned(),
        similarity: hit.similarity,
    }
}
