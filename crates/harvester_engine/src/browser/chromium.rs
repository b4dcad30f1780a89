use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventResponseReceived, GetResponseBodyParams, RequestId,
};
use chromiumoxide::{Browser, BrowserConfig, Page};
use engine_logging::{engine_debug, engine_info};
use futures_util::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::{BrowserError, BrowserLauncher, BrowserSession};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct ChromiumConfig {
    pub headless: bool,
    /// Chrome binary; chromiumoxide's lookup is used when absent.
    pub executable: Option<PathBuf>,
    pub args: Vec<String>,
}

impl Default for ChromiumConfig {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            args: vec![
                "--disable-blink-features=AutomationControlled".to_string(),
                "--disable-extensions".to_string(),
                "--disable-dev-shm-usage".to_string(),
                "--no-sandbox".to_string(),
                "--start-maximized".to_string(),
            ],
        }
    }
}

/// Launches one Chromium process per session.
#[derive(Debug, Clone, Default)]
pub struct ChromiumLauncher {
    config: ChromiumConfig,
}

impl ChromiumLauncher {
    pub fn new(config: ChromiumConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, BrowserError> {
        let mut builder = BrowserConfig::builder();
        if !self.config.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &self.config.executable {
            builder = builder.chrome_executable(path);
        }
        for arg in &self.config.args {
            builder = builder.arg(arg);
        }
        let config = builder.build().map_err(BrowserError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|err| BrowserError::Launch(err.to_string()))?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await.map_err(protocol)?;
        page.execute(EnableParams::default()).await.map_err(protocol)?;

        let responses = Arc::new(Mutex::new(Vec::new()));
        let mut events = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(protocol)?;
        let sink = Arc::clone(&responses);
        let listener_task = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                sink.lock().await.push(SeenResponse {
                    url: event.response.url.clone(),
                    request_id: event.request_id.clone(),
                });
            }
        });

        engine_info!("browser session started");
        Ok(Box::new(ChromiumSession {
            browser,
            page,
            responses,
            read_upto: 0,
            tasks: vec![handler_task, listener_task],
        }))
    }
}

struct SeenResponse {
    url: String,
    request_id: RequestId,
}

/// A single tab plus the network responses observed on it.
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    responses: Arc<Mutex<Vec<SeenResponse>>>,
    read_upto: usize,
    tasks: Vec<JoinHandle<()>>,
}

#[async_trait::async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        engine_debug!("navigating to {}", url);
        self.page
            .goto(url)
            .await
            .map_err(|err| BrowserError::Navigation {
                url: url.to_string(),
                message: err.to_string(),
            })?;
        Ok(())
    }

    async fn page_source(&mut self) -> Result<String, BrowserError> {
        self.page.content().await.map_err(protocol)
    }

    async fn wait_for_clickable(&mut self, selector: &str, timeout: Duration) -> Result<bool, BrowserError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Ok(element) = self.page.find_element(selector).await {
                if element.clickable_point().await.is_ok() {
                    return Ok(true);
                }
            }
            if tokio::time::Instant::now() + POLL_INTERVAL > deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn is_present(&mut self, selector: &str) -> Result<bool, BrowserError> {
        let elements = self.page.find_elements(selector).await.map_err(protocol)?;
        Ok(!elements.is_empty())
    }

    async fn scroll_and_click(&mut self, selector: &str) -> Result<(), BrowserError> {
        let element = self.page.find_element(selector).await.map_err(protocol)?;
        element.scroll_into_view().await.map_err(protocol)?;
        element.click().await.map_err(protocol)?;
        Ok(())
    }

    async fn latest_response_body(&mut self, url_fragment: &str) -> Result<Option<String>, BrowserError> {
        let request_id = {
            let responses = self.responses.lock().await;
            let unread = responses.get(self.read_upto..).unwrap_or_default();
            let found = unread
                .iter()
                .rev()
                .find(|seen| seen.url.contains(url_fragment))
                .map(|seen| seen.request_id.clone());
            self.read_upto = responses.len();
            found
        };
        let Some(request_id) = request_id else {
            return Ok(None);
        };

        let reply = self
            .page
            .execute(GetResponseBodyParams::new(request_id))
            .await
            .map_err(protocol)?;
        let body = if reply.result.base64_encoded {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(&reply.result.body)
                .map_err(|err| BrowserError::Protocol(err.to_string()))?;
            String::from_utf8_lossy(&bytes).into_owned()
        } else {
            reply.result.body.clone()
        };
        Ok(Some(body))
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        let closed = self.browser.close().await.map(|_| ()).map_err(protocol);
        let _ = self.browser.wait().await;
        for task in self.tasks.drain(..) {
            task.abort();
        }
        closed
    }
}

fn protocol(err: chromiumoxide::error::CdpError) -> BrowserError {
    BrowserError::Protocol(err.to_string())
}
