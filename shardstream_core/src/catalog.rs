//! Remote dataset catalog.
//!
//! The catalog owns dataset and chunk descriptors and hands out presigned
//! storage URLs. [`Catalog`] is the seam the reader and uploader depend on;
//! [`HttpCatalog`] talks to the REST service with a blocking client.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::{multipart, Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};

use crate::config::CatalogConfig;
use crate::error::{Error, IoContext, Result};

/// Dataset metadata as stored by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub id: String,
    pub name: String,
    pub sample_count: u64,
    /// Total compressed bytes.
    pub size: u64,
}

/// One uploaded shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDescriptor {
    pub id: String,
    /// Order number; readers sort by this before computing offsets.
    pub number: u64,
    /// Number of samples in the chunk.
    pub file_count: u64,
    #[serde(default)]
    pub size: u64,
    /// Storage key, ends with the shard's archive file name.
    pub location: String,
}

/// One page of a chunk listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChunkPage {
    #[serde(rename = "chunk_list")]
    pub chunks: Vec<ChunkDescriptor>,
    /// Next page number, `None` when this was the last page.
    pub next_page: Option<u32>,
}

/// Presigned POST target for uploading one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadTarget {
    pub url: String,
    /// Form fields to send verbatim alongside the file.
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Operations the pipeline consumes from the remote catalog.
///
/// All calls are synchronous; a non-success response is a
/// [`Transport`](Error::Transport) error.
pub trait Catalog: Send + Sync {
    fn find_dataset(&self, name: &str) -> Result<Option<DatasetDescriptor>>;

    fn create_dataset(&self, name: &str, sample_count: u64, size: u64) -> Result<DatasetDescriptor>;

    fn delete_dataset(&self, dataset_id: &str) -> Result<()>;

    /// One page (1-based) of the dataset's chunks, in no particular order.
    fn list_chunks(&self, dataset_id: &str, page: u32) -> Result<ChunkPage>;

    /// Number of chunks already uploaded (0 if none).
    fn latest_chunk_number(&self, dataset_id: &str) -> Result<u64>;

    /// Presigned GET URL for a chunk archive.
    fn download_url(&self, chunk_id: &str) -> Result<String>;

    /// Presigned POST target for a new chunk.
    fn upload_target(
        &self,
        dataset_id: &str,
        size: u64,
        file_key: &str,
        file_count: u64,
    ) -> Result<UploadTarget>;

    /// Download a chunk archive to `dest`.
    fn download_chunk(&self, chunk: &ChunkDescriptor, dest: &Path) -> Result<()>;

    /// Upload a local archive to a presigned target.
    fn upload_chunk(&self, target: &UploadTarget, archive: &Path, file_name: &str) -> Result<()>;

    /// Every chunk of the dataset, following pagination, sorted by order number.
    fn all_chunks(&self, dataset_id: &str) -> Result<Vec<ChunkDescriptor>> {
        let mut chunks = Vec::new();
        let mut page = Some(1);
        while let Some(p) = page {
            let listing = self.list_chunks(dataset_id, p)?;
            chunks.extend(listing.chunks);
            page = listing.next_page;
        }
        chunks.sort_by_key(|c| c.number);
        Ok(chunks)
    }
}

#[derive(Deserialize)]
struct DatasetList {
    datasets: Vec<DatasetDescriptor>,
}

#[derive(Deserialize)]
struct ChunkCount {
    latest_chunk_num: Option<u64>,
}

#[derive(Serialize)]
struct CreateDataset<'a> {
    name: &'a str,
    sample_count: u64,
    size: u64,
}

#[derive(Serialize)]
struct UploadRequest<'a> {
    dataset_id: &'a str,
    size: u64,
    file_key: &'a str,
    file_count: u64,
}

/// Blocking REST client for the catalog service.
pub struct HttpCatalog {
    base_url: String,
    project_id: String,
    api_key: String,
    client: Client,
}

impl HttpCatalog {
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::config_with_source("failed to build HTTP client", e))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            project_id: config.project_id.clone(),
            api_key: config.api_key.clone(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("project-id", &self.project_id)
            .header("api-key", &self.api_key)
    }

    fn send(&self, url: &str, request: RequestBuilder) -> Result<Response> {
        let response = request
            .send()
            .map_err(|e| Error::transport_with_source(url, "failed to send request", e))?;
        check_status(url, response)
    }

    fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = self.url(path);
        let response = self.send(&url, self.authorized(self.client.get(&url).query(query)))?;
        response
            .json()
            .map_err(|e| Error::transport_with_source(&url, "failed to parse JSON response", e))
    }

    fn post_json<B: Serialize, T: for<'de> Deserialize<'de>>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.url(path);
        let response = self.send(&url, self.authorized(self.client.post(&url).json(body)))?;
        response
            .json()
            .map_err(|e| Error::transport_with_source(&url, "failed to parse JSON response", e))
    }
}

fn check_status(url: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(Error::transport(
        url,
        format!("HTTP {status}: {body}"),
    ))
}

impl Catalog for HttpCatalog {
    fn find_dataset(&self, name: &str) -> Result<Option<DatasetDescriptor>> {
        let list: DatasetList = self.get_json("dataset/project/list", &[("page", "1"), ("name", name)])?;
        Ok(list.datasets.into_iter().next())
    }

    fn create_dataset(&self, name: &str, sample_count: u64, size: u64) -> Result<DatasetDescriptor> {
        self.post_json(
            "dataset/project/list",
            &CreateDataset {
                name,
                sample_count,
                size,
            },
        )
    }

    fn delete_dataset(&self, dataset_id: &str) -> Result<()> {
        let url = self.url("dataset/upload");
        let request = self.client.delete(&url).query(&[("dataset_id", dataset_id)]);
        self.send(&url, self.authorized(request))?;
        Ok(())
    }

    fn list_chunks(&self, dataset_id: &str, page: u32) -> Result<ChunkPage> {
        let page = page.to_string();
        self.get_json("dataset/list/chunk", &[("dataset_id", dataset_id), ("page", page.as_str())])
    }

    fn latest_chunk_number(&self, dataset_id: &str) -> Result<u64> {
        let count: ChunkCount = self.get_json("dataset/chunk/count", &[("dataset_id", dataset_id)])?;
        Ok(count.latest_chunk_num.unwrap_or(0))
    }

    fn download_url(&self, chunk_id: &str) -> Result<String> {
        self.get_json("dataset/upload", &[("chunk_id", chunk_id)])
    }

    fn upload_target(
        &self,
        dataset_id: &str,
        size: u64,
        file_key: &str,
        file_count: u64,
    ) -> Result<UploadTarget> {
        self.post_json(
            "dataset/upload",
            &UploadRequest {
                dataset_id,
                size,
                file_key,
                file_count,
            },
        )
    }

    fn download_chunk(&self, chunk: &ChunkDescriptor, dest: &Path) -> Result<()> {
        let url = self.download_url(&chunk.id)?;
        // Presigned URLs carry their own credentials.
        let mut response = self.send(&url, self.client.get(&url))?;
        let file = File::create(dest).at(dest)?;
        let mut out = BufWriter::new(file);
        response
            .copy_to(&mut out)
            .map_err(|e| Error::transport_with_source(&url, "failed to stream chunk body", e))?;
        std::io::Write::flush(&mut out).at(dest)?;
        Ok(())
    }

    fn upload_chunk(&self, target: &UploadTarget, archive: &Path, file_name: &str) -> Result<()> {
        let mut form = multipart::Form::new();
        for (key, value) in &target.fields {
            let text = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            form = form.text(key.clone(), text);
        }
        let part = multipart::Part::file(archive)
            .at(archive)?
            .file_name(file_name.to_string());
        form = form.part("file", part);

        self.send(&target.url, self.client.post(&target.url).multipart(form))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_page_uses_service_field_names() {
        let page: ChunkPage = serde_json::from_str(
            r#"{"chunk_list":[{"id":"c1","number":2,"file_count":5,"location":"x/dataset-1-5.tar.gz"}],"next_page":null}"#,
        )
        .unwrap();
        assert_eq!(page.chunks.len(), 1);
        assert_eq!(page.chunks[0].file_count, 5);
        assert_eq!(page.chunks[0].size, 0);
        assert_eq!(page.next_page, None);
    }

    #[test]
    fn empty_base_url_is_rejected() {
        let config = CatalogConfig {
            base_url: String::new(),
            ..CatalogConfig::default()
        };
        assert!(HttpCatalog::new(&config).is_err());
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let config = CatalogConfig {
            base_url: "http://localhost:8000/".into(),
            ..CatalogConfig::default()
        };
        let catalog = HttpCatalog::new(&config).unwrap();
        assert_eq!(catalog.url("dataset/upload"), "http://localhost:8000/api/dataset/upload");
    }
}
