use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::dto::{RegisterRequest, UpdateProfileRequest};
use crate::{
    auth::password::{hash_password, matches_stored, validate_new_password},
    db::{
        InsertUserError, NewTransaction, NewUser, Role, Store, TransactionKind, User,
        WELCOME_BONUS,
    },
    error::{AppError, AppResult},
    google::{decode_id_token_payload, GoogleIdentity, GoogleProfile},
    verification::services::{is_valid_email, normalize_email},
};

/// Candidates tried for a username: the base, then base1 … base999.
pub const MAX_USERNAME_ATTEMPTS: u32 = 1000;

const BONUS_PROVIDER: &str = "EcoCash System";

/// First free username of `desired`, `desired1`, `desired2`, …
pub async fn unique_username(store: &dyn Store, desired: &str) -> AppResult<String> {
    for attempt in 0..MAX_USERNAME_ATTEMPTS {
        let candidate = if attempt == 0 {
            desired.to_string()
        } else {
            format!("{desired}{attempt}")
        };
        if !store.username_exists(&candidate).await? {
            return Ok(candidate);
        }
    }
    Err(AppError::Conflict(
        "Could not allocate a username, please choose another one".into(),
    ))
}

fn email_local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}


/// Account fields before a username is allocated.
struct AccountDraft {
    username_base: String,
    /// `None` becomes `{username}@example.com`.
    email: Option<String>,
    password_hash: Option<String>,
    /// `None` falls back to the allocated username.
    first_name: Option<String>,
    last_name: String,
}

/// Allocation rounds when a concurrent sign-up claims the candidate username
/// between the lookup and the insert.
const USERNAME_RACE_RETRIES: usize = 5;

fn email_taken() -> AppError {
    AppError::Conflict("This email is already registered".into())
}

/// Allocate a username, then insert the account and its welcome bonus entry
/// as one unit. The store's uniqueness rules are the final word: a lost
/// username race moves on to the next suffix, a lost email race is a conflict.
async fn create_account(
    store: &dyn Store,
    draft: AccountDraft,
    bonus_description: &str,
) -> AppResult<User> {
    for _ in 0..USERNAME_RACE_RETRIES {
        let username = unique_username(store, &draft.username_base).await?;
        let new_user = NewUser {
            email: draft
                .email
                .clone()
                .unwrap_or_else(|| format!("{username}@example.com")),
            first_name: draft.first_name.clone().unwrap_or_else(|| username.clone()),
            last_name: draft.last_name.clone(),
            password_hash: draft.password_hash.clone(),
            username,
        };

        let mut tx = store.begin().await?;
        let user = match tx.insert_user(new_user).await {
            Ok(user) => user,
            Err(InsertUserError::UsernameTaken(name)) => {
                tx.rollback().await?;
                warn!(username = %name, "username claimed concurrently; retrying");
                continue;
            }
            Err(InsertUserError::EmailTaken(email)) => {
                tx.rollback().await?;
                warn!(%email, "email claimed concurrently");
                return Err(email_taken());
            }
            Err(InsertUserError::Other(e)) => return Err(e.into()),
        };
        tx.insert_transaction(NewTransaction {
            user_id: user.id,
            amount: WELCOME_BONUS,
            kind: TransactionKind::Earn,
            description: bonus_description.to_string(),
            provider: Some(BONUS_PROVIDER.into()),
        })
        .await?;
        tx.commit().await?;
        info!(user_id = %user.id, username = %user.username, "user registered");
        return Ok(user);
    }
    Err(AppError::Conflict(
        "Could not allocate a username, please choose another one".into(),
    ))
}

/// Username/password sign-up.
#[instrument(skip(store, req), fields(username = %req.username))]
pub async fn register(store: &dyn Store, req: RegisterRequest) -> AppResult<User> {
    let desired = req.username.trim();
    if desired.is_empty() {
        return Err(AppError::Validation("Username is required".into()));
    }
    validate_new_password(&req.password)?;
    if req.password != req.password_confirm {
        return Err(AppError::Validation("Passwords do not match".into()));
    }

    let email = req
        .email
        .as_deref()
        .map(normalize_email)
        .filter(|e| is_valid_email(e));
    if let Some(e) = &email {
        if store.find_active_by_email(e).await?.is_some() {
            return Err(email_taken());
        }
    }

    let draft = AccountDraft {
        username_base: desired.to_string(),
        email,
        password_hash: Some(hash_password(&req.password)?),
        first_name: Some(req.first_name.trim().to_string()).filter(|n| !n.is_empty()),
        last_name: req.last_name.trim().to_string(),
    };
    create_account(store, draft, "Welcome bonus").await
}

/// Create the account behind an email that just passed code verification.
#[instrument(skip(store, password))]
pub async fn register_verified(
    store: &dyn Store,
    email: &str,
    password: &str,
    first_name: &str,
    last_name: &str,
) -> AppResult<User> {
    validate_new_password(password)?;
    if store.find_active_by_email(email).await?.is_some() {
        return Err(email_taken());
    }
    let draft = AccountDraft {
        username_base: email_local_part(email).to_string(),
        email: Some(email.to_string()),
        password_hash: Some(hash_password(password)?),
        first_name: Some(first_name.trim().to_string()),
        last_name: last_name.trim().to_string(),
    };
    create_account(store, draft, "Welcome bonus").await
}

/// Resolve a login identifier: anything containing `@` is an email
/// (case-insensitive), otherwise an exact username.
#[instrument(skip(store, password))]
pub async fn login(store: &dyn Store, username_or_email: &str, password: &str) -> AppResult<User> {
    let ident = username_or_email.trim();
    if ident.is_empty() {
        return Err(AppError::Validation("Enter a username or email".into()));
    }
    if password.is_empty() {
        return Err(AppError::Validation("Enter a password".into()));
    }

    let user = if ident.contains('@') {
        store
            .find_active_by_email(&ident.to_lowercase())
            .await?
            .ok_or_else(|| AppError::Unauthorized("Email not found".into()))?
    } else {
        store
            .find_active_by_username(ident)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Username not found".into()))?
    };

    if !matches_stored(password, user.password_hash.as_deref())? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::Unauthorized("Incorrect password".into()));
    }
    info!(user_id = %user.id, "user logged in");
    Ok(user)
}

/// Work out who a Google token belongs to.
///
/// An ID token is checked with token-info; if Google cannot vouch for it the
/// decoded payload is used instead. Anything that is not a decodable ID
/// token is tried as an OAuth access token against user-info.
pub async fn resolve_google_profile(
    google: &dyn GoogleIdentity,
    token: &str,
) -> AppResult<GoogleProfile> {
    let mut profile = match decode_id_token_payload(token) {
        Some(payload) => {
            let mut verified = match google.token_info(token).await {
                Ok(Some(p)) => p,
                Ok(None) => GoogleProfile::default(),
                Err(e) => {
                    warn!(error = %e, "google tokeninfo unavailable; using token payload");
                    GoogleProfile::default()
                }
            };
            verified.fill_missing_from(&payload);
            verified
        }
        None => match google.user_info(token).await {
            Ok(Some(p)) => p,
            Ok(None) => {
                return Err(AppError::Unauthorized(
                    "Google token is invalid or expired".into(),
                ))
            }
            Err(e) => {
                warn!(error = %e, "google userinfo unavailable");
                return Err(AppError::ExternalUnavailable(
                    "Could not reach Google".into(),
                ));
            }
        },
    };

    profile.email = normalize_email(&profile.email);
    if profile.email.is_empty() {
        return Err(AppError::Validation("Google account has no email".into()));
    }
    Ok(profile)
}

/// Sign in with Google, creating the account on first use. The flag is
/// `true` when a new account was created.
#[instrument(skip(store, google, token))]
pub async fn google_sign_in(
    store: &dyn Store,
    google: &dyn GoogleIdentity,
    token: &str,
) -> AppResult<(User, bool)> {
    if token.trim().is_empty() {
        return Err(AppError::Validation("Google token is required".into()));
    }
    let profile = resolve_google_profile(google, token.trim()).await?;

    if let Some(existing) = store.find_active_by_email(&profile.email).await? {
        let user = refresh_google_names(store, existing.id, &profile).await?;
        info!(user_id = %user.id, "google login");
        return Ok((user, false));
    }

    let (first, last) = profile.split_names();
    let draft = AccountDraft {
        username_base: email_local_part(&profile.email).to_string(),
        email: Some(profile.email.clone()),
        password_hash: None,
        first_name: first,
        last_name: last,
    };
    match create_account(store, draft, "Welcome bonus (Google)").await {
        Ok(user) => Ok((user, true)),
        // a concurrent sign-in for the same account won the insert
        Err(AppError::Conflict(msg)) => match store.find_active_by_email(&profile.email).await? {
            Some(existing) => Ok((refresh_google_names(store, existing.id, &profile).await?, false)),
            None => Err(AppError::Conflict(msg)),
        },
        Err(e) => Err(e),
    }
}

/// Take over first/last name from Google when it supplies different ones.
async fn refresh_google_names(
    store: &dyn Store,
    user_id: Uuid,
    profile: &GoogleProfile,
) -> AppResult<User> {
    let mut tx = store.begin().await?;
    let mut user = match tx.lock_user(user_id).await? {
        Some(u) => u,
        None => {
            tx.rollback().await?;
            return Err(AppError::NotFound("User not found".into()));
        }
    };
    let mut changed = false;
    if !profile.given_name.is_empty() && user.first_name != profile.given_name {
        user.first_name = profile.given_name.clone();
        changed = true;
    }
    if !profile.family_name.is_empty() && user.last_name != profile.family_name {
        user.last_name = profile.family_name.clone();
        changed = true;
    }
    if changed {
        tx.save_user(&user).await?;
        tx.commit().await?;
    } else {
        tx.rollback().await?;
    }
    Ok(user)
}

pub async fn email_registered(store: &dyn Store, raw_email: &str) -> AppResult<bool> {
    let email = normalize_email(raw_email);
    if email.is_empty() {
        return Err(AppError::Validation("Enter an email".into()));
    }
    Ok(store.find_active_by_email(&email).await?.is_some())
}

/// Pick the user an account action applies to: the authenticated caller
/// when there is one, otherwise the path segment read as an id, then as a
/// username or email.
pub async fn resolve_subject(
    store: &dyn Store,
    caller: Option<Uuid>,
    path_id: &str,
) -> AppResult<User> {
    let found = match caller {
        Some(id) => store.find_user(id).await?,
        None => match Uuid::parse_str(path_id) {
            Ok(id) => store.find_user(id).await?,
            Err(_) if path_id.contains('@') => store.find_active_by_email(path_id).await?,
            Err(_) => store.find_active_by_username(path_id).await?,
        },
    };
    match found {
        Some(u) if !u.is_deleted => Ok(u),
        _ => Err(AppError::NotFound("User not found".into())),
    }
}

pub async fn active_user(store: &dyn Store, id: Uuid) -> AppResult<User> {
    match store.find_user(id).await? {
        Some(u) if !u.is_deleted => Ok(u),
        Some(_) => Err(AppError::Unauthorized("This account has been deleted".into())),
        None => Err(AppError::Unauthorized("User not found".into())),
    }
}

/// Mark the account deleted and inactive; rows are kept.
#[instrument(skip(store))]
pub async fn soft_delete(store: &dyn Store, user_id: Uuid) -> AppResult<()> {
    let mut tx = store.begin().await?;
    let mut user = match tx.lock_user(user_id).await? {
        Some(u) if !u.is_deleted => u,
        _ => {
            tx.rollback().await?;
            return Err(AppError::NotFound("User not found".into()));
        }
    };
    user.soft_delete(OffsetDateTime::now_utc());
    tx.save_user(&user).await?;
    tx.commit().await?;
    info!(%user_id, "account deleted");
    Ok(())
}

/// Edit first/last name. Users may edit themselves; admins may edit anyone.
#[instrument(skip(store, changes))]
pub async fn update_profile(
    store: &dyn Store,
    caller_id: Uuid,
    target: &str,
    changes: &UpdateProfileRequest,
) -> AppResult<User> {
    let caller = active_user(store, caller_id).await?;
    let subject = resolve_subject(store, None, target).await?;
    if caller.id != subject.id && caller.role != Role::Admin {
        warn!(caller = %caller.id, subject = %subject.id, "profile edit refused");
        return Err(AppError::Forbidden("You can only edit your own profile".into()));
    }

    let mut tx = store.begin().await?;
    let mut user = match tx.lock_user(subject.id).await? {
        Some(u) if !u.is_deleted => u,
        _ => {
            tx.rollback().await?;
            return Err(AppError::NotFound("User not found".into()));
        }
    };
    if let Some(first) = &changes.first_name {
        user.first_name = first.trim().to_string();
    }
    if let Some(last) = &changes.last_name {
        user.last_name = last.trim().to_string();
    }
    tx.save_user(&user).await?;
    tx.commit().await?;
    info!(user_id = %user.id, by = %caller.id, "profile updated");
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::testing::{profile, GoogleAnswer, ScriptedGoogle};
    use base64ct::{Base64UrlUnpadded, Encoding};
    use rust_decimal_macros::dec;

    fn register_req(username: &str, email: Option<&str>) -> RegisterRequest {
        RegisterRequest {
            username: username.into(),
            email: email.map(str::to_string),
            password: "secret1".into(),
            password_confirm: "secret1".into(),
            first_name: String::new(),
            last_name: String::new(),
        }
    }

    fn id_token(payload: &str) -> String {
        format!(
            "{}.{}.sig",
            Base64UrlUnpadded::encode_string(br#"{"alg":"RS256"}"#),
            Base64UrlUnpadded::encode_string(payload.as_bytes())
        )
    }

    #[tokio::test]
    async fn taken_usernames_get_numeric_suffixes() {
        let store = MemoryStore::new();
        let a = register(&store, register_req("alice", None)).await.unwrap();
        let b = register(&store, register_req("alice", None)).await.unwrap();
        let c = register(&store, register_req("alice", None)).await.unwrap();
        assert_eq!(a.username, "alice");
        assert_eq!(b.username, "alice1");
        assert_eq!(c.username, "alice2");
    }

    #[tokio::test]
    async fn register_fills_defaults_and_credits_bonus() {
        let store = MemoryStore::new();
        let user = register(&store, register_req("timur", Some("not-an-email"))).await.unwrap();
        assert_eq!(user.email, "timur@example.com");
        assert_eq!(user.first_name, "timur");
        assert_eq!(user.balance, WELCOME_BONUS);
        assert_eq!(user.level, 1);

        let entries = store.list_transactions(user.id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, TransactionKind::Earn);
        assert_eq!(entries[0].amount, dec!(1000));
        assert_eq!(entries[0].provider.as_deref(), Some("EcoCash System"));
    }

    #[tokio::test]
    async fn register_normalizes_email_and_rejects_duplicates() {
        let store = MemoryStore::new();
        let user = register(&store, register_req("timur", Some("  Timur@Gmail.COM ")))
            .await
            .unwrap();
        assert_eq!(user.email, "timur@gmail.com");

        let err = register(&store, register_req("other", Some("timur@gmail.com")))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn register_validates_passwords() {
        let store = MemoryStore::new();
        let mut req = register_req("timur", None);
        req.password_confirm = "different".into();
        assert!(matches!(register(&store, req).await, Err(AppError::Validation(_))));

        let mut req = register_req("timur", None);
        req.password = "12345".into();
        req.password_confirm = "12345".into();
        assert!(matches!(register(&store, req).await, Err(AppError::Validation(_))));

        assert!(matches!(
            register(&store, register_req("  ", None)).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn login_by_username_or_email() {
        let store = MemoryStore::new();
        let user = register(&store, register_req("laylo", Some("laylo@gmail.com"))).await.unwrap();

        assert_eq!(login(&store, "laylo", "secret1").await.unwrap().id, user.id);
        assert_eq!(login(&store, " LAYLO@Gmail.com ", "secret1").await.unwrap().id, user.id);
        assert!(matches!(
            login(&store, "Laylo", "secret1").await,
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            login(&store, "laylo", "wrong-pass").await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn deleted_accounts_cannot_log_in() {
        let store = MemoryStore::new();
        let user = register(&store, register_req("laylo", None)).await.unwrap();
        soft_delete(&store, user.id).await.unwrap();

        assert!(matches!(
            login(&store, "laylo", "secret1").await,
            Err(AppError::Unauthorized(_))
        ));
        let stored = store.find_user(user.id).await.unwrap().unwrap();
        assert!(stored.is_deleted);
        assert!(!stored.is_active);
        assert!(stored.deleted_at.is_some());
        assert!(matches!(soft_delete(&store, user.id).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn verified_registration_uses_email_local_part() {
        let store = MemoryStore::new();
        register(&store, register_req("rustam", None)).await.unwrap();
        let user = register_verified(&store, "rustam@gmail.com", "secret1", "Rustam", "Q")
            .await
            .unwrap();
        assert_eq!(user.username, "rustam1");
        assert_eq!(user.email, "rustam@gmail.com");
        assert_eq!(store.list_transactions(user.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn google_prefers_verified_profile() {
        let store = MemoryStore::new();
        let google = ScriptedGoogle::default();
        let token = id_token(r#"{"email":"payload@gmail.com","given_name":"Payload"}"#);
        google.on_token_info(&token, GoogleAnswer::Profile(profile("Kamola@Gmail.com", "Kamola", "")));

        let (user, created) = google_sign_in(&store, &google, &token).await.unwrap();
        assert!(created);
        assert_eq!(user.email, "kamola@gmail.com");
        assert_eq!(user.username, "kamola");
        assert_eq!(user.first_name, "Kamola");
        assert!(user.password_hash.is_none());

        let entries = store.list_transactions(user.id).await.unwrap();
        assert_eq!(entries[0].description, "Welcome bonus (Google)");
    }

    #[tokio::test]
    async fn google_falls_back_to_payload_when_unverifiable() {
        let store = MemoryStore::new();
        let google = ScriptedGoogle::default();
        let token = id_token(r#"{"email":"sherzod@gmail.com","name":"Sherzod Umarov"}"#);
        google.on_token_info(&token, GoogleAnswer::Unreachable);

        let (user, created) = google_sign_in(&store, &google, &token).await.unwrap();
        assert!(created);
        assert_eq!(user.first_name, "Sherzod");
        assert_eq!(user.last_name, "Umarov");
    }

    #[tokio::test]
    async fn google_access_token_goes_to_userinfo() {
        let store = MemoryStore::new();
        let google = ScriptedGoogle::default();
        google.on_user_info("ya29.access", GoogleAnswer::Profile(profile("zarina@gmail.com", "Zarina", "K")));

        let (user, created) = google_sign_in(&store, &google, "ya29.access").await.unwrap();
        assert!(created);
        assert_eq!(user.last_name, "K");

        google.on_user_info("ya29.revoked", GoogleAnswer::Rejected);
        let err = google_sign_in(&store, &google, "ya29.revoked").await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        google.on_user_info("ya29.down", GoogleAnswer::Unreachable);
        let err = google_sign_in(&store, &google, "ya29.down").await.unwrap_err();
        assert!(matches!(err, AppError::ExternalUnavailable(_)));
    }

    #[tokio::test]
    async fn google_login_refreshes_names_of_existing_user() {
        let store = MemoryStore::new();
        let existing = register(&store, register_req("kamola", Some("kamola@gmail.com"))).await.unwrap();
        let google = ScriptedGoogle::default();
        google.on_user_info("tok", GoogleAnswer::Profile(profile("kamola@gmail.com", "Kamola", "Yusupova")));

        let (user, created) = google_sign_in(&store, &google, "tok").await.unwrap();
        assert!(!created);
        assert_eq!(user.id, existing.id);
        let stored = store.find_user(existing.id).await.unwrap().unwrap();
        assert_eq!(stored.first_name, "Kamola");
        assert_eq!(stored.last_name, "Yusupova");
        assert!(stored.password_hash.is_some());
    }

    #[tokio::test]
    async fn google_without_email_is_rejected() {
        let store = MemoryStore::new();
        let google = ScriptedGoogle::default();
        let token = id_token(r#"{"given_name":"Nobody"}"#);
        let err = google_sign_in(&store, &google, &token).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn resolve_subject_prefers_caller() {
        let store = MemoryStore::new();
        let a = register(&store, register_req("anvar", Some("anvar@gmail.com"))).await.unwrap();
        let b = register(&store, register_req("botir", None)).await.unwrap();

        let id = b.id.to_string();
        assert_eq!(resolve_subject(&store, Some(a.id), &id).await.unwrap().id, a.id);
        assert_eq!(resolve_subject(&store, None, &id).await.unwrap().id, b.id);
        assert_eq!(resolve_subject(&store, None, "anvar").await.unwrap().id, a.id);
        assert_eq!(resolve_subject(&store, None, "anvar@gmail.com").await.unwrap().id, a.id);
        assert!(matches!(
            resolve_subject(&store, None, "nobody").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_sign_ups_cannot_share_an_email() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for name in ["first", "second", "third", "fourth"] {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                register(store.as_ref(), register_req(name, Some("same@gmail.com"))).await
            }));
        }

        let mut created = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => created += 1,
                Err(e) => assert!(matches!(e, AppError::Conflict(_)), "unexpected: {e:?}"),
            }
        }
        assert_eq!(created, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_sign_ups_get_distinct_usernames() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for i in 0..4 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let email = format!("dilshod{i}@gmail.com");
                register(store.as_ref(), register_req("dilshod", Some(&email))).await
            }));
        }

        let mut names = Vec::new();
        for h in handles {
            names.push(h.await.unwrap().unwrap().username);
        }
        names.sort();
        assert_eq!(names, vec!["dilshod", "dilshod1", "dilshod2", "dilshod3"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_google_sign_ins_share_one_account() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let google = ScriptedGoogle::default();
        google.on_user_info("tok", GoogleAnswer::Profile(profile("shared@gmail.com", "Aziza", "")));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let store = store.clone();
            let google = google.clone();
            handles.push(tokio::spawn(async move {
                google_sign_in(store.as_ref(), &google, "tok").await
            }));
        }

        let mut ids = Vec::new();
        let mut created = 0;
        for h in handles {
            let (user, was_created) = h.await.unwrap().unwrap();
            ids.push(user.id);
            if was_created {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        ids.dedup();
        assert_eq!(ids.len(), 1);
    }

    #[tokio::test]
    async fn profile_edits_are_limited_to_self_or_admin() {
        let store = MemoryStore::new();
        let owner = register(&store, register_req("owner", None)).await.unwrap();
        let other = register(&store, register_req("other", None)).await.unwrap();
        let changes = UpdateProfileRequest {
            first_name: Some("  Owner ".into()),
            last_name: None,
        };

        let updated = update_profile(&store, owner.id, &owner.id.to_string(), &changes)
            .await
            .unwrap();
        assert_eq!(updated.first_name, "Owner");
        assert_eq!(updated.last_name, owner.last_name);

        let err = update_profile(&store, other.id, &owner.id.to_string(), &changes)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let mut tx = store.begin().await.unwrap();
        let mut admin = tx.lock_user(other.id).await.unwrap().unwrap();
        admin.role = Role::Admin;
        tx.save_user(&admin).await.unwrap();
        tx.commit().await.unwrap();

        let changes = UpdateProfileRequest {
            first_name: None,
            last_name: Some("Karimov".into()),
        };
        let updated = update_profile(&store, other.id, "owner", &changes).await.unwrap();
        assert_eq!(updated.id, owner.id);
        assert_eq!(updated.last_name, "Karimov");
        assert_eq!(updated.balance, owner.balance);
    }
}
