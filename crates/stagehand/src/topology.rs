//! Topology / Session Model
//!
//! Tracks which user is logged into which application. Browsers share
//! session cookies per server, so logging in or out of one application
//! affects every application deployed on the same server.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};
use url::Url;

use crate::config::ApplicationConfig;
use crate::result::{StagehandError, StagehandResult};

/// A user account used by test steps
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    /// Login name
    pub username: String,
    /// Password, if the scenario logs in through a form
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

impl User {
    /// Create a user without a password
    #[must_use]
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: None,
        }
    }

    /// Attach a password
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.username)
    }
}

/// Derive the session-affinity address (`scheme://host[:port]`) of a location
pub fn server_of(location: &str) -> StagehandResult<String> {
    let url = Url::parse(location)?;
    let host = url.host_str().ok_or_else(|| {
        StagehandError::invalid_argument(format!("location {location} has no host"))
    })?;
    Ok(match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    })
}

/// A deployed application instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Application {
    name: String,
    location: String,
    server: String,
    current_user: Option<User>,
}

impl Application {
    /// Create an application; the server is derived from the location
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> StagehandResult<Self> {
        let location = location.into();
        let server = server_of(&location)?;
        Ok(Self::with_server(name, location, server))
    }

    /// Create an application on an explicit server
    #[must_use]
    pub fn with_server(
        name: impl Into<String>,
        location: impl Into<String>,
        server: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            server: server.into(),
            current_user: None,
        }
    }

    /// Create from configuration
    pub fn from_config(config: &ApplicationConfig) -> StagehandResult<Self> {
        match &config.server {
            Some(server) => Ok(Self::with_server(&config.name, &config.location, server)),
            None => Self::new(&config.name, &config.location),
        }
    }

    /// Display name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Base location including the context root
    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Session-affinity server address
    #[must_use]
    pub fn server(&self) -> &str {
        &self.server
    }

    /// User currently logged in, if any
    #[must_use]
    pub fn current_user(&self) -> Option<&User> {
        self.current_user.as_ref()
    }

    /// Whether `location` falls under this application (case-insensitive prefix)
    #[must_use]
    pub fn owns(&self, location: &str) -> bool {
        location
            .get(..self.location.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(&self.location))
    }

    fn set_user(&mut self, user: Option<User>) -> bool {
        if self.current_user == user {
            return false;
        }
        self.current_user = user;
        true
    }
}

/// The applications under test and their server grouping.
///
/// Every application belongs to exactly one server group; the grouping is
/// rebuilt whenever an application is added.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Topology {
    applications: Vec<Application>,
    #[serde(skip)]
    servers: BTreeMap<String, Vec<usize>>,
}

impl Topology {
    /// Create an empty topology
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a topology from configuration
    pub fn from_config(apps: &[ApplicationConfig]) -> StagehandResult<Self> {
        let mut topology = Self::new();
        for app in apps {
            topology.add(Application::from_config(app)?);
        }
        Ok(topology)
    }

    /// Add an application and regroup by server
    pub fn add(&mut self, app: Application) {
        self.applications.push(app);
        self.rebuild_servers();
    }

    fn rebuild_servers(&mut self) {
        self.servers.clear();
        for (index, app) in self.applications.iter().enumerate() {
            self.servers
                .entry(app.server.clone())
                .or_default()
                .push(index);
        }
    }

    /// All applications
    #[must_use]
    pub fn applications(&self) -> &[Application] {
        &self.applications
    }

    /// Application by name
    #[must_use]
    pub fn application(&self, name: &str) -> Option<&Application> {
        self.applications.iter().find(|app| app.name == name)
    }

    /// Names of the applications sharing `server`
    #[must_use]
    pub fn server_group(&self, server: &str) -> Vec<&str> {
        self.servers
            .get(server)
            .map(|members| {
                members
                    .iter()
                    .map(|&i| self.applications[i].name.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Distinct server addresses
    pub fn servers(&self) -> impl Iterator<Item = &str> {
        self.servers.keys().map(String::as_str)
    }

    /// Resolve the application owning `location`.
    ///
    /// When several context roots are prefixes of the location, the longest
    /// one wins.
    pub fn resolve(&self, location: &str) -> StagehandResult<&Application> {
        self.resolve_index(location).map(|i| &self.applications[i])
    }

    fn resolve_index(&self, location: &str) -> StagehandResult<usize> {
        self.applications
            .iter()
            .enumerate()
            .filter(|(_, app)| app.owns(location))
            .max_by_key(|(_, app)| app.location.len())
            .map(|(i, _)| i)
            .ok_or_else(|| StagehandError::NoApplicationFound {
                location: location.to_string(),
            })
    }

    fn server_mates(&self, index: usize) -> Vec<usize> {
        let server = &self.applications[index].server;
        self.servers
            .get(server)
            .map(|members| members.iter().copied().filter(|&i| i != index).collect())
            .unwrap_or_default()
    }

    /// Log `user` into the application owning `location`.
    ///
    /// Server-mates pick up the same user directly. Returns `false` without
    /// touching anything when the application already has `user`.
    pub fn login(&mut self, location: &str, user: &User) -> StagehandResult<bool> {
        let index = self.resolve_index(location)?;
        if self.applications[index].current_user.as_ref() == Some(user) {
            debug!(app = %self.applications[index].name, %user, "already logged in");
            return Ok(false);
        }

        let mut changed = self.applications[index].set_user(Some(user.clone()));
        for mate in self.server_mates(index) {
            changed |= self.applications[mate].set_user(Some(user.clone()));
        }
        info!(
            app = %self.applications[index].name,
            server = %self.applications[index].server,
            %user,
            "logged in"
        );
        Ok(changed)
    }

    /// Log out of the application owning `location` and its server-mates.
    ///
    /// Returns whether the resolved application itself changed; server-mates
    /// changing does not count.
    pub fn logout(&mut self, location: &str) -> StagehandResult<bool> {
        let index = self.resolve_index(location)?;
        let changed = self.applications[index].set_user(None);
        for mate in self.server_mates(index) {
            let _ = self.applications[mate].set_user(None);
        }
        if changed {
            info!(
                app = %self.applications[index].name,
                server = %self.applications[index].server,
                "logged out"
            );
        }
        Ok(changed)
    }

    /// Clear every session, e.g. before acquiring a new browser session
    pub fn logout_all(&mut self) {
        for app in &mut self.applications {
            let _ = app.set_user(None);
        }
    }

    /// Whether a login as `user` is required before using `location`.
    ///
    /// A server-mate already logged in as `user` counts as an established
    /// session even though the target's own record was never updated.
    pub fn need_login(&self, location: &str, user: Option<&User>) -> StagehandResult<bool> {
        let user = user.ok_or_else(|| {
            StagehandError::invalid_argument("login status is undefined without a user")
        })?;
        let index = self.resolve_index(location)?;
        if self.applications[index].current_user.as_ref() == Some(user) {
            return Ok(false);
        }
        let shared = self
            .server_mates(index)
            .into_iter()
            .any(|mate| self.applications[mate].current_user.as_ref() == Some(user));
        Ok(!shared)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const A: &str = "https://host1:1/portal";
    const B: &str = "https://host1:1/admin";
    const C: &str = "https://host2:1/portal";

    fn topology() -> Topology {
        let mut t = Topology::new();
        t.add(Application::new("a", A).unwrap());
        t.add(Application::new("b", B).unwrap());
        t.add(Application::new("c", C).unwrap());
        t
    }

    fn user_of<'t>(t: &'t Topology, name: &str) -> Option<&'t str> {
        t.application(name)
            .and_then(Application::current_user)
            .map(|u| u.username.as_str())
    }

    mod server_tests {
        use super::*;

        #[test]
        fn test_server_of_keeps_scheme_host_port() {
            assert_eq!(server_of(A).unwrap(), "https://host1:1");
            assert_eq!(server_of("http://example.com/app/x").unwrap(), "http://example.com");
        }

        #[test]
        fn test_server_of_rejects_garbage() {
            assert!(matches!(server_of("not a url"), Err(StagehandError::Url(_))));
        }

        #[test]
        fn test_grouping() {
            let t = topology();
            assert_eq!(t.server_group("https://host1:1"), vec!["a", "b"]);
            assert_eq!(t.server_group("https://host2:1"), vec!["c"]);
            assert_eq!(t.servers().count(), 2);
        }

        #[test]
        fn test_from_config_honors_explicit_server() {
            let apps = vec![
                ApplicationConfig::new("a", A),
                ApplicationConfig::new("x", "https://lb.example/x").with_server("https://host1:1"),
            ];
            let t = Topology::from_config(&apps).unwrap();
            assert_eq!(t.server_group("https://host1:1"), vec!["a", "x"]);
        }
    }

    mod resolve_tests {
        use super::*;

        #[test]
        fn test_prefix_is_case_insensitive() {
            let t = topology();
            let app = t.resolve("HTTPS://HOST1:1/Portal/orders?id=4").unwrap();
            assert_eq!(app.name(), "a");
        }

        #[test]
        fn test_unknown_location() {
            let t = topology();
            let err = t.resolve("https://host9:1/portal").unwrap_err();
            assert!(matches!(err, StagehandError::NoApplicationFound { .. }));
        }

        #[test]
        fn test_longest_context_root_wins() {
            let mut t = Topology::new();
            t.add(Application::new("root", "https://h:1/").unwrap());
            t.add(Application::new("shop", "https://h:1/shop").unwrap());
            assert_eq!(t.resolve("https://h:1/shop/cart").unwrap().name(), "shop");
            assert_eq!(t.resolve("https://h:1/blog").unwrap().name(), "root");
        }

        #[test]
        fn test_short_location_does_not_panic() {
            let t = topology();
            assert!(t.resolve("https").is_err());
        }
    }

    mod session_tests {
        use super::*;

        #[test]
        fn test_login_propagates_to_server_mates_only() {
            let mut t = topology();
            assert!(t.login(A, &User::new("alice")).unwrap());
            assert_eq!(user_of(&t, "a"), Some("alice"));
            assert_eq!(user_of(&t, "b"), Some("alice"));
            assert_eq!(user_of(&t, "c"), None);
        }

        #[test]
        fn test_second_login_is_noop() {
            let mut t = topology();
            let alice = User::new("alice");
            assert!(t.login(A, &alice).unwrap());
            assert!(!t.login(A, &alice).unwrap());
        }

        #[test]
        fn test_login_as_other_user_replaces_session() {
            let mut t = topology();
            t.login(A, &User::new("alice")).unwrap();
            assert!(t.login(B, &User::new("bob")).unwrap());
            assert_eq!(user_of(&t, "a"), Some("bob"));
        }

        #[test]
        fn test_logout_scenario() {
            let mut t = topology();
            t.login(A, &User::new("alice")).unwrap();

            assert!(!t.logout(C).unwrap());
            assert_eq!(user_of(&t, "a"), Some("alice"));
            assert_eq!(user_of(&t, "b"), Some("alice"));

            assert!(t.logout(A).unwrap());
            assert_eq!(user_of(&t, "a"), None);
            assert_eq!(user_of(&t, "b"), None);
        }

        #[test]
        fn test_logout_reports_only_target_change() {
            let mut t = topology();
            t.login(A, &User::new("alice")).unwrap();
            t.logout(A).unwrap();
            // a is already logged out; b was cleared too
            assert!(!t.logout(B).unwrap());
        }

        #[test]
        fn test_logout_all() {
            let mut t = topology();
            t.login(A, &User::new("alice")).unwrap();
            t.login(C, &User::new("carol")).unwrap();
            t.logout_all();
            assert!(t.applications().iter().all(|a| a.current_user().is_none()));
        }
    }

    mod need_login_tests {
        use super::*;

        #[test]
        fn test_requires_user() {
            let t = topology();
            let err = t.need_login(A, None).unwrap_err();
            assert!(matches!(err, StagehandError::InvalidArgument { .. }));
        }

        #[test]
        fn test_needed_when_nobody_logged_in() {
            let t = topology();
            assert!(t.need_login(A, Some(&User::new("alice"))).unwrap());
        }

        #[test]
        fn test_not_needed_for_same_user() {
            let mut t = topology();
            let alice = User::new("alice");
            t.login(A, &alice).unwrap();
            assert!(!t.need_login(A, Some(&alice)).unwrap());
            assert!(t.need_login(A, Some(&User::new("bob"))).unwrap());
        }

        #[test]
        fn test_server_mate_session_satisfies_target() {
            let mut t = Topology::new();
            t.add(Application::new("a", A).unwrap());
            t.add(Application::new("b", B).unwrap());
            let alice = User::new("alice");
            // only b's record knows about the session
            t.applications[1].current_user = Some(alice.clone());

            assert!(!t.need_login(A, Some(&alice)).unwrap());
            assert_eq!(user_of(&t, "a"), None);
        }

        #[test]
        fn test_other_server_does_not_satisfy() {
            let mut t = topology();
            let alice = User::new("alice");
            t.login(C, &alice).unwrap();
            assert!(t.need_login(A, Some(&alice)).unwrap());
        }
    }

    proptest! {
        #[test]
        fn prop_login_propagates_within_server(
            hosts in proptest::collection::vec(0u8..3, 1..8),
            pick in any::<prop::sample::Index>(),
            name in "[a-z]{1,8}",
        ) {
            let mut t = Topology::new();
            for (i, host) in hosts.iter().enumerate() {
                let location = format!("https://host{host}:1/app{i}");
                t.add(Application::new(format!("app{i}"), location).unwrap());
            }
            let target = pick.index(hosts.len());
            let location = t.applications()[target].location().to_string();
            let server = t.applications()[target].server().to_string();
            let user = User::new(name);

            t.login(&location, &user).unwrap();
            for app in t.applications() {
                if app.server() == server {
                    prop_assert_eq!(app.current_user(), Some(&user));
                } else {
                    prop_assert_eq!(app.current_user(), None);
                }
            }
            prop_assert!(!t.login(&location, &user).unwrap());

            t.logout(&location).unwrap();
            for app in t.applications() {
                prop_assert_eq!(app.current_user(), None);
            }
        }
    }
}
