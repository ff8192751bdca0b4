use std::fmt::{self, Display};

use crate::session::Session;
use crate::token;
use crate::transport::{NetworkError, PortalRequest, PortalResponse, RequestBody, Transport};
use crate::types::Credential;

const DASHBOARD_MARKER: &str = "dashboard";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("CSRF token not found on the portal home page")]
    TokenNotFound,
    #[error("Login rejected (landed on {url})")]
    LoginRejected { url: String },
    #[error("Network failure during login: {0}")]
    Network(#[from] NetworkError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Start,
    HomeFetched,
    LoginSubmitted,
    Authenticated,
    Failed,
}

impl Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthState::Start => "START",
            AuthState::HomeFetched => "HOME_FETCHED",
            AuthState::LoginSubmitted => "LOGIN_SUBMITTED",
            AuthState::Authenticated => "AUTHENTICATED",
            AuthState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Login handshake against the portal.
///
/// The token must come from the portal root: the `/login` page itself does not
/// issue one the server will accept. A failed login re-renders the form
/// without redirecting, so success is judged on the landing URL or on the
/// identifier being echoed back in the page, never on the status code.
pub struct LoginFlow<'s, T> {
    session: &'s mut Session<T>,
    state: AuthState,
}

impl<'s, T: Transport> LoginFlow<'s, T> {
    pub fn new(session: &'s mut Session<T>) -> Self {
        Self {
            session,
            state: AuthState::Start,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    pub async fn run(&mut self, credential: &Credential) -> Result<(), AuthError> {
        let token = self.fetch_home().await?;
        let response = self.submit_login(&token, credential).await?;
        self.verify(&response, credential)
    }

    async fn fetch_home(&mut self) -> Result<String, AuthError> {
        log::info!("Fetching portal home page to get CSRF token...");
        let home = self.session.base_url().to_string();
        let response = match self.session.fetch(&PortalRequest::get(home)).await {
            Ok(response) => response,
            Err(e) => return Err(self.fail(e.into())),
        };

        let Some(token) = token::hidden_input_token(&response.body) else {
            return Err(self.fail(AuthError::TokenNotFound));
        };

        self.session.set_csrf_token(token.clone());
        self.advance(AuthState::HomeFetched);
        Ok(token)
    }

    async fn submit_login(
        &mut self,
        token: &str,
        credential: &Credential,
    ) -> Result<PortalResponse, AuthError> {
        log::info!("Logging in with identifier: {}", credential.identifier);
        let form = vec![
            ("_token".to_string(), token.to_string()),
            ("emis_code".to_string(), credential.identifier.clone()),
            ("password".to_string(), credential.secret.clone()),
        ];
        let request = PortalRequest::post(
            self.session.url(crate::LOGIN_PATH),
            RequestBody::Form(form),
        );

        match self.session.fetch(&request).await {
            Ok(response) => {
                self.advance(AuthState::LoginSubmitted);
                Ok(response)
            }
            Err(e) => Err(self.fail(e.into())),
        }
    }

    fn verify(
        &mut self,
        response: &PortalResponse,
        credential: &Credential,
    ) -> Result<(), AuthError> {
        let on_dashboard = response.url.to_lowercase().contains(DASHBOARD_MARKER);
        let identifier = credential.identifier.to_uppercase();
        let echoed = !identifier.is_empty() && response.body.to_uppercase().contains(&identifier);

        if on_dashboard || echoed {
            log::info!("Login successful, landed on {}", response.url);
            self.advance(AuthState::Authenticated);
            Ok(())
        } else {
            Err(self.fail(AuthError::LoginRejected {
                url: response.url.clone(),
            }))
        }
    }

    fn advance(&mut self, next: AuthState) {
        log::info!("Auth: {} -> {}", self.state, next);
        self.state = next;
    }

    fn fail(&mut self, error: AuthError) -> AuthError {
        log::error!("Auth: {} -> {}: {}", self.state, AuthState::Failed, error);
        self.state = AuthState::Failed;
        error
    }
}

/// Runs the full login handshake, leaving `session` with authenticated cookies.
pub async fn authenticate<T: Transport>(
    session: &mut Session<T>,
    credential: &Credential,
) -> Result<(), AuthError> {
    LoginFlow::new(session).run(credential).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::RetryPolicy;
    use crate::testing::{FakePortal, html_response, home_page};
    use crate::transport::Method;

    const BASE: &str = "https://portal.test";

    fn credential() -> Credential {
        Credential::new("3210390175935", "12345678")
    }

    fn session(portal: FakePortal) -> Session<FakePortal> {
        Session::with_transport(portal, BASE, RetryPolicy::no_retry())
    }

    #[tokio::test]
    async fn test_login_redirected_to_dashboard() {
        let portal = FakePortal::new(|request, _| match request.method {
            Method::Get => Ok(html_response(&request.url, &home_page(Some("home-tok")))),
            Method::Post => Ok(html_response("https://portal.test/Dashboard", "<h1>Welcome</h1>")),
        });
        let mut session = session(portal);

        let mut flow = LoginFlow::new(&mut session);
        flow.run(&credential()).await.expect("login should succeed");
        assert_eq!(flow.state(), AuthState::Authenticated);

        assert_eq!(session.csrf_token(), Some("home-tok"));
        let requests = session.transport().requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].url, BASE);
        assert_eq!(requests[1].url, "https://portal.test/login");
        assert_eq!(requests[1].body_field("_token"), Some("home-tok"));
        assert_eq!(requests[1].body_field("emis_code"), Some("3210390175935"));
        assert_eq!(requests[1].body_field("password"), Some("12345678"));
    }

    #[tokio::test]
    async fn test_login_accepted_when_identifier_echoed() {
        let portal = FakePortal::new(|request, _| match request.method {
            Method::Get => Ok(html_response(&request.url, &home_page(Some("tok")))),
            Method::Post => Ok(html_response(
                "https://portal.test/home",
                "<span class=\"user\">Emis: 3210390175935</span>",
            )),
        });
        let mut session = session(portal);

        authenticate(&mut session, &credential())
            .await
            .expect("echoed identifier should count as success");
    }

    #[tokio::test]
    async fn test_login_rejected_when_form_rerendered() {
        let portal = FakePortal::new(|request, _| match request.method {
            Method::Get => Ok(html_response(&request.url, &home_page(Some("tok")))),
            Method::Post => Ok(html_response(BASE, &home_page(Some("tok2")))),
        });
        let mut session = session(portal);

        let mut flow = LoginFlow::new(&mut session);
        let result = flow.run(&credential()).await;

        assert!(matches!(result, Err(AuthError::LoginRejected { .. })));
        assert_eq!(flow.state(), AuthState::Failed);
    }

    #[tokio::test]
    async fn test_missing_home_token_fails_before_login() {
        let portal =
            FakePortal::new(|request, _| Ok(html_response(&request.url, &home_page(None))));
        let mut session = session(portal);

        let mut flow = LoginFlow::new(&mut session);
        let result = flow.run(&credential()).await;

        assert!(matches!(result, Err(AuthError::TokenNotFound)));
        assert_eq!(flow.state(), AuthState::Failed);
        assert_eq!(session.transport().requests().len(), 1);
    }

    #[tokio::test]
    async fn test_network_failure_is_fatal() {
        let portal = FakePortal::new(|request, _| match request.method {
            Method::Get => Ok(html_response(&request.url, &home_page(Some("tok")))),
            Method::Post => Err(NetworkError::Connection("connection reset".into())),
        });
        let mut session = session(portal);

        let result = authenticate(&mut session, &credential()).await;

        assert!(matches!(result, Err(AuthError::Network(_))));
    }
}
