//! MongoDB document backend

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use mongodb::options::IndexOptions;
use mongodb::{Client, Database, IndexModel};

use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::storage::backend::{DocumentBackend, QueryOptions};

/// MongoDB-backed store. Cheap to clone; the driver pools connections
/// internally.
#[derive(Clone)]
pub struct MongoBackend {
    client: Client,
    database_name: String,
}

impl MongoBackend {
    /// Connect using a connection string.
    pub async fn connect(url: &str, database: &str) -> Result<Self> {
        let client = Client::with_uri_str(url).await?;
        Ok(Self {
            client,
            database_name: database.to_string(),
        })
    }

    /// Connect per the database configuration.
    pub async fn from_config(config: &DatabaseConfig) -> Result<Self> {
        Self::connect(&config.url, &config.name).await
    }

    fn database(&self) -> Database {
        self.client.database(&self.database_name)
    }
}

#[async_trait]
impl DocumentBackend for MongoBackend {
    async fn insert_one(&self, collection: &str, document: Document) -> Result<Bson> {
        let coll = self.database().collection::<Document>(collection);
        let result = coll.insert_one(document).await?;
        Ok(result.inserted_id)
    }

    async fn find_one(&self, collection: &str, filter: Document) -> Result<Option<Document>> {
        let coll = self.database().collection::<Document>(collection);
        Ok(coll.find_one(filter).await?)
    }

    async fn find_many(
        &self,
        collection: &str,
        filter: Document,
        options: QueryOptions,
    ) -> Result<Vec<Document>> {
        use futures::stream::TryStreamExt;

        let coll = self.database().collection::<Document>(collection);

        let mut find_options = mongodb::options::FindOptions::default();
        find_options.sort = options.sort;
        find_options.skip = options.skip;
        find_options.limit = options.limit;

        let cursor = coll.find(filter).with_options(find_options).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<u64> {
        let coll = self.database().collection::<Document>(collection);
        let result = coll.update_one(filter, update).await?;
        Ok(result.modified_count)
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> Result<u64> {
        let coll = self.database().collection::<Document>(collection);
        let result = coll.delete_one(filter).await?;
        Ok(result.deleted_count)
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> Result<u64> {
        let coll = self.database().collection::<Document>(collection);
        let result = coll.delete_many(filter).await?;
        Ok(result.deleted_count)
    }

    async fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> Result<Vec<Document>> {
        use futures::stream::TryStreamExt;

        let coll = self.database().collection::<Document>(collection);
        let cursor = coll.aggregate(pipeline).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn distinct(
        &self,
        collection: &str,
        field: &str,
        filter: Document,
    ) -> Result<Vec<Bson>> {
        let coll = self.database().collection::<Document>(collection);
        Ok(coll.distinct(field, filter).await?)
    }

    async fn ensure_unique_index(&self, collection: &str, field: &str) -> Result<()> {
        let coll = self.database().collection::<Document>(collection);
        let index = IndexModel::builder()
            .keys(doc! { field: 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        coll.create_index(index).await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        self.database().run_command(doc! { "ping": 1 }).await?;
        Ok(true)
    }

    fn name(&self) -> &str {
        "mongodb"
    }
}
