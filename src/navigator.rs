//! Navigation targets and the capability that performs them
use log::{info, warn};
use reqwest::Url;
use std::fmt;

/// Where the user is sent next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Library overview for a signed-in user
    Landing,
    /// Sign-in screen
    Login,
    /// Page outside the application, such as the consent dialog
    External(Url),
}

impl Route {
    pub fn path(&self) -> &str {
        match self {
            Route::Landing => "/",
            Route::Login => "/login",
            Route::External(url) => url.as_str(),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);
}

/// Opens external routes in the system browser
///
/// Application routes have no screen of their own in a terminal, so
/// they are only logged.
#[derive(Debug, Default, Clone)]
pub struct BrowserNavigator;

impl Navigator for BrowserNavigator {
    fn navigate(&self, route: Route) {
        match route {
            Route::External(url) => {
                if let Err(e) = webbrowser::open(url.as_str()) {
                    warn!("Could not open a browser: {}", e);
                    println!("Open this URL in your browser:\n\n  {}\n", url);
                }
            }
            other => info!("Navigating to {}", other),
        }
    }
}
