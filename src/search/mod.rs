//! Full-text lookup of menu nodes by name and body text.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, BoostQuery, Occur, Query, QueryParser};
use tantivy::schema::{Field, Schema, Value, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::MenuNode;

const BOOST_NAME: f32 = 3.0;
const BOOST_TEXT: f32 = 1.0;

/// A node matching a search, best first.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub node_id: Uuid,
    pub name: String,
    pub score: f32,
}

struct SearchFields {
    node_id: Field,
    name: Field,
    text: Field,
}

pub struct MenuIndex {
    index: Index,
    reader: IndexReader,
    writer: Arc<RwLock<IndexWriter>>,
    fields: SearchFields,
}

impl MenuIndex {
    /// Open the index at `index_path`, creating it if needed.
    pub fn open(index_path: &Path) -> Result<Self, AppError> {
        std::fs::create_dir_all(index_path)
            .map_err(|e| AppError::Internal(format!("Failed to create index directory: {}", e)))?;

        let mut schema_builder = Schema::builder();
        let node_id = schema_builder.add_text_field("node_id", STRING | STORED);
        let name = schema_builder.add_text_field("name", TEXT | STORED);
        let text = schema_builder.add_text_field("text", TEXT);
        let schema = schema_builder.build();

        let index = Index::open_in_dir(index_path)
            .or_else(|_| Index::create_in_dir(index_path, schema))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()?;

        let writer = index.writer(50_000_000)?;

        Ok(Self {
            index,
            reader,
            writer: Arc::new(RwLock::new(writer)),
            fields: SearchFields { node_id, name, text },
        })
    }

    /// Replace the whole index with `nodes`.
    pub async fn rebuild(&self, nodes: &[MenuNode]) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;
        writer.delete_all_documents()?;
        for node in nodes {
            writer.add_document(self.document(node))?;
        }
        writer.commit()?;
        self.reader.reload()?;

        tracing::info!("Menu index rebuilt with {} nodes", nodes.len());
        Ok(())
    }

    /// Insert or replace one node.
    pub async fn upsert(&self, node: &MenuNode) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;
        writer.delete_term(self.id_term(node.id));
        writer.add_document(self.document(node))?;
        writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }

    pub async fn remove(&self, node_id: Uuid) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;
        writer.delete_term(self.id_term(node_id));
        writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }

    /// Search names and texts; names weigh more. A blank query matches nothing.
    pub fn search(&self, query_str: &str, limit: usize) -> Result<Vec<SearchHit>, AppError> {
        if query_str.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let mut subqueries: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for (field, boost) in [(self.fields.name, BOOST_NAME), (self.fields.text, BOOST_TEXT)] {
            let mut parser = QueryParser::for_index(&self.index, vec![field]);
            parser.set_conjunction_by_default();
            let (query, _errors) = parser.parse_query_lenient(query_str);
            subqueries.push((Occur::Should, Box::new(BoostQuery::new(query, boost))));
        }
        let query = BooleanQuery::new(subqueries);

        let searcher = self.reader.searcher();
        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;

        let hits = top_docs
            .into_iter()
            .filter_map(|(score, address)| {
                let doc: TantivyDocument = searcher.doc(address).ok()?;
                let node_id = doc.get_first(self.fields.node_id)?.as_str()?;
                let name = doc.get_first(self.fields.name)?.as_str()?;
                Some(SearchHit {
                    node_id: Uuid::parse_str(node_id).ok()?,
                    name: name.to_string(),
                    score,
                })
            })
            .collect();

        Ok(hits)
    }

    fn id_term(&self, node_id: Uuid) -> Term {
        Term::from_field_text(self.fields.node_id, &node_id.to_string())
    }

    fn document(&self, node: &MenuNode) -> TantivyDocument {
        doc!(
            self.fields.node_id => node.id.to_string(),
            self.fields.name => node.name.clone(),
            self.fields.text => node.text.clone().unwrap_or_default()
        )
    }
}
