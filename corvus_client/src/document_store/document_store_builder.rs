use std::{fs::File, io::Read};

use reqwest::Url;
use tracing::instrument;

use crate::{
    DnsOverrides, DocumentConventions, DocumentStore, DocumentStoreError,
    DocumentStoreInitialConfiguration,
};

#[derive(Debug, Default)]
pub struct DocumentStoreBuilder {
    client_certificate_path: Option<String>,
    conventions: Option<DocumentConventions>,
    database_name: Option<String>,
    dns_overrides: Option<DnsOverrides>,
    document_store_urls: Vec<String>,
    proxy_address: Option<String>,
}

impl DocumentStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_conventions(mut self, conventions: DocumentConventions) -> Self {
        self.conventions = Some(conventions);
        self
    }

    pub fn set_dns_overrides(mut self, overrides: DnsOverrides) -> Self {
        tracing::trace!("Adding to dns_overrides: {:?}", &overrides);
        self.dns_overrides = Some(overrides);
        self
    }

    pub fn set_client_certificate(mut self, certificate_path: &str) -> Self {
        self.client_certificate_path = Some(certificate_path.to_string());
        self
    }

    pub fn set_proxy_address(mut self, proxy_address: &str) -> Self {
        self.proxy_address = Some(proxy_address.to_string());
        self
    }

    pub fn set_urls<T>(mut self, urls: &[T]) -> Self
    where
        T: AsRef<str>,
    {
        for u in urls {
            self.document_store_urls.push(u.as_ref().to_string());
        }
        self
    }

    pub fn set_database_name(mut self, database_name: &str) -> Self {
        self.database_name = Some(database_name.to_string());
        self
    }

    /// Initializes a new [`DocumentStoreActor`] and returns a handle to it.
    ///
    /// Each call to this will create a new actor and return a new handle to
    /// it. It is not recommended to create more than one per database
    /// cluster. This function is allowed to be called more than once so the
    /// builder can act as a template after being set up once.
    ///
    /// [`DocumentStoreActor`]: crate::DocumentStoreActor
    #[instrument(level = "debug", name = "Build DocumentStoreBuilder", skip(self))]
    pub fn build(&self) -> Result<DocumentStore, DocumentStoreError> {
        // Ensure DocumentStore URLs are valid and there is at least one
        if self.document_store_urls.is_empty() {
            tracing::error!(
                "No URLs were supplied and a document store can't exist without at least one"
            );
            return Err(DocumentStoreError::MissingUrlsError);
        }

        let initial_urls = validate_urls(
            self.document_store_urls.as_slice(),
            self.client_certificate_path.is_some(),
        )?;

        let identity = match &self.client_certificate_path {
            Some(certpath) => {
                // Open and validate certificate, and create an identity from it
                let mut buf = Vec::new();
                File::open(certpath)
                    .map_err(|e| {
                        let err =
                            anyhow::anyhow!("Failed to open certificate file. Caused by: {}", e);
                        tracing::error!("{}", &err);
                        err
                    })?
                    .read_to_end(&mut buf)
                    .map_err(|e| {
                        let err =
                            anyhow::anyhow!("File was opened but unable to read. Caused by: {}", e);
                        tracing::error!("{}", err);
                        err
                    })?;
                let id = reqwest::Identity::from_pem(&buf).map_err(|e| {
                    let err = anyhow::anyhow!("Invalid pem file. Caused by: {}", e);
                    tracing::error!("{}", err);
                    err
                })?;
                Some(id)
            }
            None => None,
        };

        // Create an initial configuration for the DocumentStoreActor
        let initial_config = DocumentStoreInitialConfiguration {
            client_identity: identity,
            conventions: self.conventions.clone().unwrap_or_default(),
            database_name: self.database_name.clone(),
            dns_overrides: self.dns_overrides.clone(),
            initial_urls,
            proxy_address: self.proxy_address.clone(),
        };

        tracing::trace!("Initial Configuration: {:?}", &initial_config);

        Ok(DocumentStore::new(initial_config))
    }
}

/// Converts the provided URL strings to a [`Vec`] of [`Url`], ensuring they
/// are a valid format. The input order is preserved: it is the preference
/// order for topology-fetch fallback.
///
/// Also ensures all provided URL strings use the same scheme: either https
/// or http, but never both within the list.
#[instrument(level = "debug", name = "Validate URLs")]
fn validate_urls<T: std::fmt::Debug>(urls: &[T], require_https: bool) -> anyhow::Result<Vec<Url>>
where
    T: AsRef<str>,
{
    let mut clean_urls = Vec::with_capacity(urls.len());
    for url in urls {
        let parsed = Url::parse(url.as_ref())
            .map_err(|e| anyhow::anyhow!("Invalid url `{}`: {}", url.as_ref(), e))?;
        if !clean_urls.contains(&parsed) {
            clean_urls.push(parsed);
        }
    }

    let desired_scheme = if require_https { "https" } else { "http" };
    for url in &clean_urls {
        if url.scheme() != desired_scheme {
            return Err(anyhow::anyhow!("Url does not have correct scheme: {}", url));
        }
    }

    Ok(clean_urls)
}
