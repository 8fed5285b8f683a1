//! Read-only calendar backed by an .ics file or a remote feed.

use std::path::PathBuf;

use tracing::debug;
use url::Url;

use super::SourcedEvent;
use crate::error::{CalCacheError, CalCacheResult};
use crate::ics::parse_ics;

/// Where the ICS text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IcsSource {
    File(PathBuf),
    Url(Url),
}

impl IcsSource {
    /// A remote feed. `webcal://` is fetched over https.
    pub fn remote(url: &str) -> Option<Self> {
        let url = match url.strip_prefix("webcal://") {
            Some(rest) => format!("https://{}", rest),
            None => url.to_string(),
        };

        let parsed = Url::parse(&url).ok()?;
        matches!(parsed.scheme(), "http" | "https").then_some(IcsSource::Url(parsed))
    }

    /// A file on disk; `~` is expanded.
    pub fn file(path: &str) -> Self {
        IcsSource::File(PathBuf::from(shellexpand::tilde(path).into_owned()))
    }

    async fn fetch(&self) -> CalCacheResult<String> {
        match self {
            IcsSource::File(path) => Ok(tokio::fs::read_to_string(path).await?),
            IcsSource::Url(url) => {
                let client = reqwest::Client::builder()
                    .user_agent(concat!("calcache/", env!("CARGO_PKG_VERSION")))
                    .build()?;
                let response = client.get(url.clone()).send().await?;

                if !response.status().is_success() {
                    return Err(CalCacheError::Fetch(format!(
                        "{} returned HTTP {}",
                        url,
                        response.status()
                    )));
                }

                Ok(response.text().await?)
            }
        }
    }
}

pub struct IcsCalendar {
    id: String,
    color: String,
    source: IcsSource,
}

impl IcsCalendar {
    pub fn new(id: String, color: &str, source: IcsSource) -> Self {
        IcsCalendar {
            id,
            color: color.to_string(),
            source,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn source(&self) -> &IcsSource {
        &self.source
    }

    /// Fetch and parse the whole feed. Its events have no location.
    pub async fn events(&self) -> CalCacheResult<Vec<SourcedEvent>> {
        let text = self.source.fetch().await?;
        let events = parse_ics(&text)?;
        debug!(calendar = %self.id, count = events.len(), "Loaded ICS calendar");
        Ok(events.into_iter().map(|event| (event, None)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_sources_accept_web_schemes_only() {
        assert_eq!(
            IcsSource::remote("webcal://example.com/cal.ics"),
            Some(IcsSource::Url(
                Url::parse("https://example.com/cal.ics").unwrap()
            ))
        );
        assert!(IcsSource::remote("http://example.com/cal.ics").is_some());
        assert!(IcsSource::remote("file:///etc/passwd").is_none());
        assert!(IcsSource::remote("not a url").is_none());
    }

    #[tokio::test]
    async fn reads_events_from_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cal.ics");
        std::fs::write(
            &path,
            "BEGIN:VCALENDAR\nVERSION:2.0\nPRODID:TEST\nBEGIN:VEVENT\nUID:a\nSUMMARY:Launch\nDTSTART;VALUE=DATE:20240301\nEND:VEVENT\nEND:VCALENDAR\n",
        )
        .unwrap();

        let calendar = IcsCalendar::new(
            "ics::cal".into(),
            "red",
            IcsSource::File(path),
        );
        let events = calendar.events().await.unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0.title(), "Launch");
        assert_eq!(events[0].0.id(), Some("ics::a::2024-03-01::single"));
        assert!(events[0].1.is_none());
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let calendar = IcsCalendar::new(
            "ics::gone".into(),
            "red",
            IcsSource::File(PathBuf::from("/definitely/not/here.ics")),
        );
        assert!(matches!(
            calendar.events().await,
            Err(CalCacheError::Io(_))
        ));
    }
}
