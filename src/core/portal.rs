// Portal endpoints for the Ufora (Brightspace/D2L) learning environment

use url::Url;

pub const BASE_URL: &str = "https://ufora.ugent.be";
pub const LOGIN_URL: &str = "https://elosp.ugent.be/welcome/uforalogin?";
pub const LANDING_PATH: &str = "/d2l/home";

/// Hosts that only serve login pages. Ending up here means the session is gone.
pub const IDENTITY_HOSTS: &[&str] = &["elosp.ugent.be", "login.microsoftonline.com"];

/// Enrollment API versions, newest first
pub const API_VERSIONS: &[&str] = &["1.28", "1.9", "1.8", "1.4", "1.0"];

/// URL layout of the portal
#[derive(Debug, Clone)]
pub struct Portal {
    base: Url,
    login: Url,
}

impl Default for Portal {
    fn default() -> Self {
        Self {
            base: Url::parse(BASE_URL).expect("BASE_URL is a valid URL"),
            login: Url::parse(LOGIN_URL).expect("LOGIN_URL is a valid URL"),
        }
    }
}

impl Portal {
    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn login_url(&self) -> &Url {
        &self.login
    }

    pub fn landing_url(&self) -> Url {
        self.join(LANDING_PATH)
    }

    /// True when `url` is the post-login landing page
    pub fn is_landing(&self, url: &str) -> bool {
        match Url::parse(url) {
            Ok(parsed) => {
                parsed.host_str() == self.base.host_str() && parsed.path().starts_with(LANDING_PATH)
            }
            Err(_) => false,
        }
    }

    /// True when `url` belongs to the identity provider (login pages)
    pub fn is_identity_provider(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        if IDENTITY_HOSTS.contains(&host) {
            return true;
        }
        // A login page served from a separate host counts as well
        self.login.host_str() == Some(host) && self.base.host_str() != Some(host)
    }

    /// Cookie domain used when seeding the HTTP cookie jar
    pub fn host(&self) -> &str {
        self.base.host_str().unwrap_or_default()
    }

    pub fn content_home(&self, course_id: &str) -> Url {
        self.join(&format!("/d2l/le/content/{}/Home", course_id))
    }

    /// Switches the content view to the table of contents
    pub fn toc_state_url(&self, course_id: &str) -> Url {
        let mut url = self.join(&format!("/d2l/le/content/{}/PartialMainView", course_id));
        url.query_pairs_mut()
            .append_pair("identifier", "TOC")
            .append_pair("moduleTitle", "Table of Contents")
            .append_pair("_d2l_prc$headingLevel", "2")
            .append_pair("_d2l_prc$scope", "")
            .append_pair("_d2l_prc$hasActiveForm", "false")
            .append_pair("isXhr", "true");
        url
    }

    pub fn module_listing(&self, course_id: &str, module_id: &str) -> Url {
        let mut url = self.join(&format!("/d2l/le/content/{}/ModuleDetailsPartial", course_id));
        url.query_pairs_mut()
            .append_pair("mId", module_id)
            .append_pair("writeHistoryEntry", "0")
            .append_pair("_d2l_prc$headingLevel", "2")
            .append_pair("_d2l_prc$scope", "")
            .append_pair("_d2l_prc$hasActiveForm", "false")
            .append_pair("isXhr", "true");
        url
    }

    pub fn file_download(&self, course_id: &str, topic_id: &str) -> Url {
        self.join(&format!(
            "/d2l/le/content/{}/topics/files/download/{}/DirectFileTopicDownload",
            course_id, topic_id
        ))
    }

    pub fn enrollments(&self, version: &str, bookmark: Option<&str>) -> Url {
        let mut url = self.join(&format!(
            "/d2l/api/lp/{}/enrollments/myenrollments/",
            version
        ));
        if let Some(bookmark) = bookmark {
            url.query_pairs_mut().append_pair("Bookmark", bookmark);
        }
        url
    }

    fn join(&self, path: &str) -> Url {
        let mut url = self.base.clone();
        url.set_path(path);
        url
    }
}
