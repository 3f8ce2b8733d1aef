//! Account store: registered users persisted as a JSON array in one file.
//!
//! The whole collection is read at startup and rewritten on every
//! registration. Lookups are linear scans; emails are compared exactly
//! (case-sensitive) after the caller's input has been trimmed.
//!
//! Files written by older releases store the display name under `nome`.
//! Those still load, but every save writes `name`, so a rewritten file is
//! no longer readable by a program that only knows `nome`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// One registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    /// Display name. Older files wrote this under `nome`.
    #[serde(alias = "nome")]
    pub name: String,
    pub email: String,
    /// Plaintext, as the file format has always stored it.
    pub password: String,
}

impl UserAccount {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Failures reading or writing the store file
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to read account store {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("account store {} is not a valid account list: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write account store {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    fn read(path: &Path, source: io::Error) -> Self {
        Self::Read {
            path: path.to_path_buf(),
            source,
        }
    }

    fn write(path: &Path, source: io::Error) -> Self {
        Self::Write {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Form fields that validation errors are attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Name,
    Email,
    Password,
    ConfirmPassword,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email",
            Self::Password => "password",
            Self::ConfirmPassword => "confirm_password",
        }
    }
}

/// A validation failure scoped to one form field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: Field,
    pub message: String,
}

impl FieldError {
    fn new(field: Field, message: &str) -> Self {
        Self {
            field,
            message: message.to_string(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]: {}", self.field.as_str(), self.message)
    }
}

/// Errors surfaced by login and registration
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("invalid input: {}", join_field_errors(.0))]
    Validation(Vec<FieldError>),

    /// Deliberately the same for an unknown email and a wrong password.
    #[error("incorrect email or password")]
    AuthenticationFailure,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl AccountError {
    /// Field errors carried by a validation failure; empty for other kinds.
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Self::Validation(errors) => errors,
            _ => &[],
        }
    }
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Raw input of the registration form
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

/// Read the account list at `path`, creating the file with `[]` if it is missing.
///
/// A blank file is treated like a missing one and rewritten as `[]`.
pub fn load(path: &Path) -> Result<Vec<UserAccount>, StorageError> {
    if !path.exists() {
        save(path, &[])?;
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(path).map_err(|e| StorageError::read(path, e))?;
    if content.trim().is_empty() {
        save(path, &[])?;
        return Ok(Vec::new());
    }

    serde_json::from_str(&content).map_err(|source| StorageError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

/// Replace the file at `path` with `accounts`, pretty printed with 4-space indents.
///
/// Writes a sibling `.tmp` file and renames it into place.
pub fn save(path: &Path, accounts: &[UserAccount]) -> Result<(), StorageError> {
    let content = to_pretty_json(accounts).map_err(|e| StorageError::write(path, e.into()))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| StorageError::write(path, e))?;
    }

    let tmp_path = temp_path_for(path);
    if let Err(e) = fs::write(&tmp_path, &content) {
        let _ = fs::remove_file(&tmp_path);
        return Err(StorageError::write(path, e));
    }
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(StorageError::write(path, e));
    }
    Ok(())
}

fn to_pretty_json(accounts: &[UserAccount]) -> serde_json::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    accounts.serialize(&mut ser)?;
    Ok(buf)
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "users.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// First account whose email and password both match exactly.
pub fn authenticate<'a>(
    accounts: &'a [UserAccount],
    email: &str,
    password: &str,
) -> Option<&'a UserAccount> {
    accounts
        .iter()
        .find(|a| a.email == email && a.password == password)
}

/// Check a registration form against `accounts`, returning every violated rule.
pub fn validate_registration(accounts: &[UserAccount], form: &Registration) -> Vec<FieldError> {
    let name = form.name.trim();
    let email = form.email.trim();
    let password = form.password.trim();
    let confirm = form.confirm_password.trim();
    let mut errors = Vec::new();

    if name.is_empty() {
        errors.push(FieldError::new(Field::Name, "Name must not be empty."));
    }

    if email.is_empty() {
        errors.push(FieldError::new(Field::Email, "Email must not be empty."));
    } else if accounts.iter().any(|a| a.email == email) {
        errors.push(FieldError::new(Field::Email, "Email already registered."));
    }

    if password.is_empty() {
        errors.push(FieldError::new(Field::Password, "Password must not be empty."));
    }

    if confirm.is_empty() {
        errors.push(FieldError::new(
            Field::ConfirmPassword,
            "Please confirm your password.",
        ));
    } else if password != confirm {
        errors.push(FieldError::new(
            Field::ConfirmPassword,
            "Passwords do not match.",
        ));
    }

    errors
}

/// The account file together with its in-memory copy.
///
/// All mutation goes through [`AccountStore::register`], which keeps the
/// memory and the file in step: a failed save leaves memory untouched.
#[derive(Debug)]
pub struct AccountStore {
    path: PathBuf,
    accounts: Vec<UserAccount>,
}

impl AccountStore {
    /// Load (or create) the store at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let accounts = load(&path)?;
        Ok(Self { path, accounts })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn accounts(&self) -> &[UserAccount] {
        &self.accounts
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Exact-match credential lookup. Inputs are expected to be trimmed.
    pub fn authenticate(&self, email: &str, password: &str) -> Option<&UserAccount> {
        authenticate(&self.accounts, email, password)
    }

    /// Validate the login form, then authenticate.
    pub fn login(&self, email: &str, password: &str) -> Result<&UserAccount, AccountError> {
        let email = email.trim();
        let password = password.trim();

        let mut errors = Vec::new();
        if email.is_empty() {
            errors.push(FieldError::new(Field::Email, "Email must not be empty."));
        }
        if password.is_empty() {
            errors.push(FieldError::new(Field::Password, "Password must not be empty."));
        }
        if !errors.is_empty() {
            return Err(AccountError::Validation(errors));
        }

        self.authenticate(email, password)
            .ok_or(AccountError::AuthenticationFailure)
    }

    /// Validate the form, append the new account and persist the whole list.
    pub fn register(&mut self, form: &Registration) -> Result<&UserAccount, AccountError> {
        let errors = validate_registration(&self.accounts, form);
        if !errors.is_empty() {
            return Err(AccountError::Validation(errors));
        }

        let mut updated = self.accounts.clone();
        updated.push(UserAccount::new(
            form.name.trim(),
            form.email.trim(),
            form.password.trim(),
        ));
        save(&self.path, &updated)?;
        self.accounts = updated;

        let index = self.accounts.len() - 1;
        Ok(&self.accounts[index])
    }
}
