use std::env;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Postgres,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(StoreBackend::Memory),
            "postgres" | "pg" => Ok(StoreBackend::Postgres),
            other => anyhow::bail!("STORE_BACKEND must be memory or postgres, got {other}"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub api_port: u16,
    pub frontend_url: Option<String>,
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub link_events_channel: String,
    pub graph_default_depth: usize,
    pub graph_max_depth: usize,
    pub is_production: bool,
}

fn parsed<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let api_port: u16 = parsed("API_PORT", 8899);
        let frontend_url = env::var("FRONTEND_URL").ok();
        let database_url = env::var("DATABASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty());
        let store_backend = match env::var("STORE_BACKEND") {
            Ok(v) => v.parse()?,
            Err(_) if database_url.is_some() => StoreBackend::Postgres,
            Err(_) => StoreBackend::Memory,
        };
        let link_events_channel =
            env::var("LINK_EVENTS_CHANNEL").unwrap_or_else(|_| "link_events".into());
        let graph_max_depth: usize = parsed("GRAPH_MAX_DEPTH", 5);
        let graph_default_depth = parsed::<usize>("GRAPH_DEFAULT_DEPTH", 2).min(graph_max_depth);
        let is_production = matches!(
            env::var("RUST_ENV").ok().as_deref(),
            Some("production") | Some("prod")
        );

        Self {
            api_port,
            frontend_url,
            store_backend,
            database_url,
            link_events_channel,
            graph_default_depth,
            graph_max_depth,
            is_production,
        }
        .validated()
    }

    fn validated(self) -> anyhow::Result<Self> {
        if self.store_backend == StoreBackend::Postgres && self.database_url.is_none() {
            anyhow::bail!("DATABASE_URL is required when STORE_BACKEND=postgres");
        }
        if self.link_events_channel.trim().is_empty() {
            anyhow::bail!("LINK_EVENTS_CHANNEL must not be empty");
        }
        // The in-memory store loses every link on restart.
        if self.is_production {
            if self.store_backend != StoreBackend::Postgres {
                anyhow::bail!("production requires STORE_BACKEND=postgres");
            }
            if !self
                .frontend_url
                .as_deref()
                .is_some_and(|u| u.starts_with("http"))
            {
                anyhow::bail!(
                    "FRONTEND_URL must be set to a full origin in production (e.g., https://app.example.com)"
                );
            }
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Config {
        Config {
            api_port: 8899,
            frontend_url: None,
            store_backend: StoreBackend::Memory,
            database_url: None,
            link_events_channel: "link_events".into(),
            graph_default_depth: 2,
            graph_max_depth: 5,
            is_production: false,
        }
    }

    #[test]
    fn backend_names_parse() {
        assert_eq!("PG".parse::<StoreBackend>().unwrap(), StoreBackend::Postgres);
        assert_eq!("memory".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert!("sqlite".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn postgres_needs_a_database_url() {
        let cfg = Config {
            store_backend: StoreBackend::Postgres,
            ..base()
        };
        assert!(cfg.validated().is_err());
    }

    #[test]
    fn production_rejects_memory_store() {
        let cfg = Config {
            is_production: true,
            frontend_url: Some("https://notes.example.com".into()),
            ..base()
        };
        assert!(cfg.validated().is_err());

        let cfg = Config {
            is_production: true,
            frontend_url: Some("https://notes.example.com".into()),
            store_backend: StoreBackend::Postgres,
            database_url: Some("postgres://localhost/notes".into()),
            ..base()
        };
        assert!(cfg.validated().is_ok());
    }
}
