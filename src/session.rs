//! Screen routing for one interactive session.
//!
//! Logged out, only the login and registration screens are reachable.
//! Logged in, the user moves between the home and stopwatch screens. The
//! stopwatch exists only while its screen is shown.

use crate::accounts::{AccountError, AccountStore, Registration, UserAccount};
use crate::stopwatch::Stopwatch;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Screen {
    #[default]
    Login,
    Register,
    Home,
    Stopwatch,
}

impl Screen {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Register => "register",
            Self::Home => "home",
            Self::Stopwatch => "stopwatch",
        }
    }

    fn requires_login(&self) -> bool {
        matches!(self, Self::Home | Self::Stopwatch)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NavigationError {
    #[error("log in to open the {} screen", .0.as_str())]
    LoginRequired(Screen),

    #[error("already logged in; log out first to open the {} screen", .0.as_str())]
    AlreadyLoggedIn(Screen),

    #[error("the stopwatch screen is not open")]
    NoStopwatch,
}

pub struct Session {
    screen: Screen,
    user: Option<UserAccount>,
    stopwatch: Option<Stopwatch>,
    tick_interval: Duration,
}

impl Session {
    pub fn new(tick_interval: Duration) -> Self {
        Self {
            screen: Screen::Login,
            user: None,
            stopwatch: None,
            tick_interval,
        }
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn user(&self) -> Option<&UserAccount> {
        self.user.as_ref()
    }

    pub fn is_logged_in(&self) -> bool {
        self.user.is_some()
    }

    /// Line shown on the home screen
    pub fn greeting(&self) -> String {
        match &self.user {
            Some(user) => format!("User: {}", user.name),
            None => "User: Guest".to_string(),
        }
    }

    /// Switch screens, building or dropping the stopwatch as needed.
    pub fn navigate(&mut self, to: Screen) -> Result<Screen, NavigationError> {
        if to.requires_login() && !self.is_logged_in() {
            return Err(NavigationError::LoginRequired(to));
        }
        if !to.requires_login() && self.is_logged_in() {
            return Err(NavigationError::AlreadyLoggedIn(to));
        }
        Ok(self.enter(to))
    }

    fn enter(&mut self, to: Screen) -> Screen {
        let from = self.screen;
        // Always a fresh stopwatch on entry, even from the stopwatch screen
        self.stopwatch = match to {
            Screen::Stopwatch => Some(Stopwatch::new(self.tick_interval)),
            _ => None,
        };
        self.screen = to;
        from
    }

    /// Log in and go home. Credentials are checked before anything changes,
    /// so a failed attempt leaves the current user, screen and stopwatch alone.
    pub fn login(
        &mut self,
        store: &AccountStore,
        email: &str,
        password: &str,
    ) -> Result<&UserAccount, AccountError> {
        let user = store.login(email, password)?.clone();
        self.enter(Screen::Home);
        let user = self.user.insert(user);
        Ok(&*user)
    }

    /// Register, then send the user back to the login screen.
    pub fn register(
        &mut self,
        store: &mut AccountStore,
        form: &Registration,
    ) -> Result<UserAccount, AccountError> {
        let account = store.register(form)?.clone();
        if !self.is_logged_in() {
            self.enter(Screen::Login);
        }
        Ok(account)
    }

    /// Forget the user and return to login. Returns the user that was logged in.
    pub fn logout(&mut self) -> Option<UserAccount> {
        let user = self.user.take();
        self.enter(Screen::Login);
        user
    }

    pub fn stopwatch(&self) -> Result<&Stopwatch, NavigationError> {
        self.stopwatch.as_ref().ok_or(NavigationError::NoStopwatch)
    }

    pub fn stopwatch_mut(&mut self) -> Result<&mut Stopwatch, NavigationError> {
        self.stopwatch.as_mut().ok_or(NavigationError::NoStopwatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> AccountStore {
        let path = dir.path().join("users.json");
        accounts::save(&path, &[UserAccount::new("Ana", "a@x.com", "p1")]).unwrap();
        AccountStore::open(path).unwrap()
    }

    fn session() -> Session {
        Session::new(Duration::from_millis(50))
    }

    #[test]
    fn test_starts_on_login_as_guest() {
        let session = session();
        assert_eq!(session.screen(), Screen::Login);
        assert_eq!(session.greeting(), "User: Guest");
        assert!(session.stopwatch().is_err());
    }

    #[test]
    fn test_main_screens_need_login() {
        let mut session = session();
        assert_eq!(
            session.navigate(Screen::Home),
            Err(NavigationError::LoginRequired(Screen::Home))
        );
        assert_eq!(session.screen(), Screen::Login);
        assert_eq!(session.navigate(Screen::Register), Ok(Screen::Login));
        assert_eq!(session.screen(), Screen::Register);
    }

    #[test]
    fn test_login_goes_home() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let mut session = session();

        session.login(&store, "a@x.com", "p1").unwrap();
        assert_eq!(session.screen(), Screen::Home);
        assert_eq!(session.greeting(), "User: Ana");
        assert_eq!(
            session.navigate(Screen::Login),
            Err(NavigationError::AlreadyLoggedIn(Screen::Login))
        );
    }

    #[test]
    fn test_failed_login_stays_put() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let mut session = session();

        assert!(matches!(
            session.login(&store, "a@x.com", "nope"),
            Err(AccountError::AuthenticationFailure)
        ));
        assert_eq!(session.screen(), Screen::Login);
        assert!(!session.is_logged_in());
    }

    #[test]
    fn test_failed_login_keeps_logged_in_session() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let mut session = session();
        session.login(&store, "a@x.com", "p1").unwrap();
        session.navigate(Screen::Stopwatch).unwrap();
        session.stopwatch_mut().unwrap().start();
        session.stopwatch().unwrap().increment_repetition();

        assert!(matches!(
            session.login(&store, "a@x.com", "wrong"),
            Err(AccountError::AuthenticationFailure)
        ));
        assert!(matches!(
            session.login(&store, "", ""),
            Err(AccountError::Validation(_))
        ));
        assert_eq!(session.screen(), Screen::Stopwatch);
        assert_eq!(session.greeting(), "User: Ana");
        let sw = session.stopwatch().unwrap();
        assert!(sw.is_running());
        assert_eq!(sw.repetitions(), 1);
    }

    #[test]
    fn test_login_while_logged_in_switches_user() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        store
            .register(&Registration {
                name: "Bea".to_string(),
                email: "b@x.com".to_string(),
                password: "p2".to_string(),
                confirm_password: "p2".to_string(),
            })
            .unwrap();
        let mut session = session();
        session.login(&store, "a@x.com", "p1").unwrap();
        session.navigate(Screen::Stopwatch).unwrap();

        session.login(&store, "b@x.com", "p2").unwrap();
        assert_eq!(session.screen(), Screen::Home);
        assert_eq!(session.greeting(), "User: Bea");
        assert!(session.stopwatch().is_err());
    }

    #[test]
    fn test_register_returns_to_login() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        let mut session = session();
        session.navigate(Screen::Register).unwrap();

        let form = Registration {
            name: "Bea".to_string(),
            email: "b@x.com".to_string(),
            password: "p2".to_string(),
            confirm_password: "p2".to_string(),
        };
        let account = session.register(&mut store, &form).unwrap();
        assert_eq!(account.name, "Bea");
        assert_eq!(session.screen(), Screen::Login);
        assert!(!session.is_logged_in());
    }

    #[test]
    fn test_stopwatch_resets_when_screen_reentered() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let mut session = session();
        session.login(&store, "a@x.com", "p1").unwrap();

        session.navigate(Screen::Stopwatch).unwrap();
        session.stopwatch().unwrap().increment_repetition();
        session.stopwatch_mut().unwrap().start();

        session.navigate(Screen::Home).unwrap();
        assert!(session.stopwatch().is_err());

        session.navigate(Screen::Stopwatch).unwrap();
        let sw = session.stopwatch().unwrap();
        assert!(!sw.is_running());
        assert_eq!(sw.repetitions(), 0);
        assert_eq!(sw.display(), "00:00.00");
    }

    #[test]
    fn test_logout_drops_user_and_stopwatch() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let mut session = session();
        session.login(&store, "a@x.com", "p1").unwrap();
        session.navigate(Screen::Stopwatch).unwrap();

        let user = session.logout().unwrap();
        assert_eq!(user.email, "a@x.com");
        assert_eq!(session.screen(), Screen::Login);
        assert_eq!(session.greeting(), "User: Guest");
        assert!(session.stopwatch().is_err());
    }
}
