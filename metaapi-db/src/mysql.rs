//! MySQL driver: [`Connector`]/[`Session`] over a single sqlx connection
//!
//! Sessions run with autocommit off, so writes become visible only when the
//! verb façade commits. Statements without binds go over the text protocol;
//! statements with binds are prepared.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_rds::auth_token::{AuthTokenGenerator, Config as AuthTokenConfig};
use futures::TryStreamExt;
use serde_json::Value;
use sqlx::mysql::{
    MySqlArguments, MySqlColumn, MySqlConnectOptions, MySqlConnection, MySqlRow, MySqlSslMode,
};
use sqlx::query::Query;
use sqlx::{Column, Connection, Either, Executor, MySql, Row as _, TypeInfo, ValueRef};

use crate::config::{DbConfig, Password};
use crate::connection::{Connector, Endpoint, ExecOutcome, Row, Session};
use crate::error::{DbError, Result};
use crate::template::Statement;

/// Connects to MySQL with static or IAM credentials
pub struct MysqlConnector {
    config: DbConfig,
    endpoint: Endpoint,
    /// Loaded only for IAM authentication
    aws: Option<SdkConfig>,
}

impl MysqlConnector {
    pub async fn new(config: DbConfig) -> Self {
        let aws = if config.uses_iam() {
            Some(
                aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(config.region.clone()))
                    .load()
                    .await,
            )
        } else {
            None
        };
        let endpoint = Endpoint {
            hostname: config.host.clone(),
            username: config.username.clone(),
        };
        Self {
            config,
            endpoint,
            aws,
        }
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    async fn connect_options(&self) -> Result<MySqlConnectOptions> {
        let mut options = MySqlConnectOptions::new()
            .host(&self.config.host)
            .port(self.config.port)
            .username(&self.config.username);
        if let Some(database) = &self.config.database {
            options = options.database(database);
        }

        match &self.config.password {
            Password::Static(password) => Ok(options.password(password)),
            Password::Iam => {
                let token = self.auth_token().await?;
                Ok(options
                    .password(&token)
                    .ssl_mode(MySqlSslMode::VerifyCa)
                    .ssl_ca(&self.config.ssl_ca)
                    .enable_cleartext_plugin(true))
            }
        }
    }

    async fn auth_token(&self) -> Result<String> {
        let sdk = self
            .aws
            .as_ref()
            .ok_or_else(|| DbError::auth_token("AWS configuration not loaded"))?;
        let generator = AuthTokenGenerator::new(
            AuthTokenConfig::builder()
                .hostname(&self.config.host)
                .port(u64::from(self.config.port))
                .username(&self.config.username)
                .build()
                .map_err(|e| DbError::auth_token(e.to_string()))?,
        );
        let token = generator
            .auth_token(sdk)
            .await
            .map_err(|e| DbError::auth_token(e.to_string()))?;
        Ok(token.as_str().to_owned())
    }
}

#[async_trait]
impl Connector for MysqlConnector {
    type Session = MysqlSession;

    async fn connect(&self) -> Result<MysqlSession> {
        let options = self.connect_options().await?;
        let mut conn = MySqlConnection::connect_with(&options).await?;
        (&mut conn).execute("SET autocommit = 0").await?;
        Ok(MysqlSession { conn })
    }

    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

pub struct MysqlSession {
    conn: MySqlConnection,
}

#[async_trait]
impl Session for MysqlSession {
    async fn ping(&mut self) -> Result<()> {
        self.conn.ping().await?;
        Ok(())
    }

    async fn execute(&mut self, statement: &Statement) -> Result<ExecOutcome> {
        let mut outcome = ExecOutcome::default();
        let mut results = if statement.binds.is_empty() {
            (&mut self.conn).fetch_many(sqlx::raw_sql(&statement.sql))
        } else {
            let query = statement
                .binds
                .iter()
                .fold(sqlx::query(&statement.sql), bind_json);
            (&mut self.conn).fetch_many(query)
        };

        while let Some(item) = results.try_next().await? {
            match item {
                Either::Left(done) => {
                    outcome.rows_affected += done.rows_affected();
                    if done.last_insert_id() != 0 {
                        outcome.last_insert_id = done.last_insert_id();
                    }
                }
                Either::Right(row) => outcome.rows.push(decode_row(&row)?),
            }
        }
        Ok(outcome)
    }

    async fn commit(&mut self) -> Result<()> {
        (&mut self.conn).execute("COMMIT").await?;
        Ok(())
    }

    async fn close(self) -> Result<()> {
        self.conn.close().await?;
        Ok(())
    }
}

fn bind_json<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &Value,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if let Some(u) = n.as_u64() {
                query.bind(u)
            } else {
                query.bind(n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}

fn decode_row(row: &MySqlRow) -> Result<Row> {
    let mut decoded = Row::new();
    for column in row.columns() {
        decoded.insert(column.name().to_owned(), decode_column(row, column)?);
    }
    Ok(decoded)
}

fn decode_column(row: &MySqlRow, column: &MySqlColumn) -> Result<Value> {
    let index = column.ordinal();
    if row.try_get_raw(index)?.is_null() {
        return Ok(Value::Null);
    }

    let type_name = column.type_info().name();
    let value = match type_name {
        "BOOLEAN" => Value::Bool(row.try_get::<bool, _>(index)?),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            Value::from(row.try_get_unchecked::<i64, _>(index)?)
        }
        name if name.ends_with("UNSIGNED") => Value::from(row.try_get_unchecked::<u64, _>(index)?),
        "YEAR" => Value::from(row.try_get_unchecked::<u16, _>(index)?),
        "FLOAT" => Value::from(f64::from(row.try_get::<f32, _>(index)?)),
        "DOUBLE" => Value::from(row.try_get::<f64, _>(index)?),
        "DATETIME" | "TIMESTAMP" => {
            Value::String(row.try_get::<chrono::NaiveDateTime, _>(index)?.to_string())
        }
        "DATE" => Value::String(row.try_get::<chrono::NaiveDate, _>(index)?.to_string()),
        "TIME" => Value::String(row.try_get::<chrono::NaiveTime, _>(index)?.to_string()),
        "JSON" => {
            let raw = row.try_get_unchecked::<String, _>(index)?;
            serde_json::from_str(&raw).unwrap_or(Value::String(raw))
        }
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
        | "GEOMETRY" => {
            let bytes = row.try_get_unchecked::<Vec<u8>, _>(index)?;
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        }
        // CHAR, VARCHAR, TEXT, DECIMAL, ENUM, SET
        _ => Value::String(row.try_get_unchecked::<String, _>(index)?),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::BackoffPolicy;
    use crate::connection::ConnectionManager;
    use crate::template::Context;

    // Integration tests require a real MySQL server
    // Run with: DB_HOST=... DB_USERNAME=... DB_PASSWORD=... cargo test -p metaapi-db -- --ignored

    #[tokio::test]
    #[ignore = "requires database"]
    async fn select_one_round_trip() {
        let config = DbConfig::from_env().expect("DB_* variables required");
        let manager =
            ConnectionManager::new(MysqlConnector::new(config).await, BackoffPolicy::default());
        let mut session = manager.connect().await.expect("connect failed");

        let statement = crate::store::QueryStore::default()
            .statement("SELECT {{n}} AS n, 'x' AS s", &{
                let mut ctx = Context::new();
                ctx.insert("n".into(), Value::from(1));
                ctx
            })
            .unwrap();
        let outcome = session.execute(&statement).await.expect("query failed");

        assert_eq!(outcome.rows.len(), 1);
        assert_eq!(outcome.rows[0].get("s"), Some(&Value::from("x")));
        session.close().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn connect_and_commit_round_trip() {
        let config = DbConfig::from_env().expect("DB_* variables required");
        let connector = MysqlConnector::new(config).await;

        let mut writer = connector.connect().await.expect("connect failed");
        let create = crate::store::QueryStore::default()
            .statement("CREATE TEMPORARY TABLE IF NOT EXISTS t (n INT)", &Context::new())
            .unwrap();
        writer.execute(&create).await.expect("create failed");
        writer.commit().await.expect("commit failed");
        writer.ping().await.expect("session still usable after commit");
        writer.close().await.unwrap();
    }

    fn iam_config() -> DbConfig {
        DbConfig::from_lookup(|name| match name {
            "DB_HOST" => Some("db.example.rds.amazonaws.com".into()),
            "DB_USERNAME" => Some("app".into()),
            "DB_PASSWORD" => Some("IAM".into()),
            "DB_SSL_CA" => Some("/etc/ssl/rds.pem".into()),
            _ => None,
        })
        .unwrap()
    }

    async fn offline_aws() -> SdkConfig {
        aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(aws_sdk_rds::config::Credentials::new(
                "AKIDEXAMPLE",
                "secret",
                None,
                None,
                "static",
            ))
            .load()
            .await
    }

    #[tokio::test]
    async fn iam_password_uses_token_and_verified_tls() {
        let config = iam_config();
        let connector = MysqlConnector {
            endpoint: Endpoint {
                hostname: config.host.clone(),
                username: config.username.clone(),
            },
            config,
            aws: Some(offline_aws().await),
        };

        let token = connector.auth_token().await.expect("token generated offline");
        assert!(
            token.starts_with("db.example.rds.amazonaws.com:3306/?Action=connect"),
            "{token}"
        );
        assert!(token.contains("DBUser=app"), "{token}");

        let options = connector.connect_options().await.unwrap();
        assert!(matches!(options.get_ssl_mode(), MySqlSslMode::VerifyCa));
        assert_eq!(options.get_host(), "db.example.rds.amazonaws.com");
        assert_eq!(options.get_port(), 3306);
        assert_eq!(options.get_username(), "app");
    }

    #[tokio::test]
    async fn static_password_skips_aws_setup() {
        let config = DbConfig::from_lookup(|name| match name {
            "DB_HOST" => Some("localhost".into()),
            "DB_USERNAME" => Some("app".into()),
            "DB_PASSWORD" => Some("secret".into()),
            _ => None,
        })
        .unwrap();
        let connector = MysqlConnector::new(config).await;

        assert!(connector.aws.is_none());
        assert_eq!(connector.endpoint().hostname, "localhost");
        assert!(matches!(
            connector.auth_token().await,
            Err(DbError::AuthToken { .. })
        ));
    }
}
