use std::future::Future;
use std::path::{Path, PathBuf};

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use super::dto::{
    ChangePasswordRequest, LoginRequest, LoginResponse, PublicUser, RefreshRequest, RegisterForm,
    TokenPair,
};
use super::model::{normalize_handle, NewUser, User};
use crate::{
    auth::AuthUser,
    error::{ApiResponse, AppError, Result},
    media::{temp::spool_field, MediaIngestor, UploadError, UploadResult},
    state::AppState,
};

const MIN_PASSWORD_LEN: usize = 8;

pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/users/login", post(login))
        .route("/users/refresh-token", post(refresh_token))
        .route("/users/logout", post(logout))
        .route("/users/current-user", get(current_user))
        .route("/users/change-password", post(change_password))
}

pub fn register_routes() -> Router<AppState> {
    Router::new()
        .route("/users/register", post(register))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)) // 20MB
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// POST /users/register (multipart)
/// Fields: fullname, email, username, password, avatar (file), cover_image (file, optional)
#[instrument(skip(state, mp))]
pub async fn register(
    State(state): State<AppState>,
    mut mp: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<PublicUser>>)> {
    let form = read_register_form(&mut mp, Path::new(&state.config.upload_temp_dir)).await?;
    let created = create_user(&state, &form).await;
    form.discard_files().await;
    let user = created?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(
            StatusCode::CREATED,
            PublicUser::from(&user),
            "user registered successfully",
        )),
    ))
}

async fn read_register_form(mp: &mut Multipart, temp_dir: &Path) -> Result<RegisterForm> {
    let mut form = RegisterForm::default();
    let read: Result<()> = async {
        while let Some(field) = mp.next_field().await.map_err(UploadError::from)? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "avatar" => {
                    let path = spool_field(temp_dir, field).await?;
                    keep_latest(&mut form.avatar, path).await;
                }
                "cover_image" | "coverImage" => {
                    let path = spool_field(temp_dir, field).await?;
                    keep_latest(&mut form.cover_image, path).await;
                }
                "fullname" | "email" | "username" | "password" => {
                    let value = field
                        .text()
                        .await
                        .map_err(UploadError::from)?;
                    match name.as_str() {
                        "fullname" => form.fullname = value,
                        "email" => form.email = value,
                        "username" => form.username = value,
                        _ => form.password = value,
                    }
                }
                other => warn!(field = other, "ignoring unknown register field"),
            }
        }
        Ok::<(), AppError>(())
    }
    .await;

    if let Err(e) = read {
        form.discard_files().await;
        return Err(e);
    }
    Ok(form)
}

// A repeated file field wins over the earlier one, whose spool is removed.
async fn keep_latest(slot: &mut Option<PathBuf>, path: PathBuf) {
    if let Some(old) = slot.replace(path) {
        warn!(path = %old.display(), "duplicate file field, dropping earlier part");
        if let Err(e) = tokio::fs::remove_file(&old).await {
            warn!(error = %e, path = %old.display(), "could not remove temp file");
        }
    }
}

async fn create_user(state: &AppState, form: &RegisterForm) -> Result<User> {
    let required = [&form.fullname, &form.email, &form.username, &form.password];
    if required.iter().any(|v| v.trim().is_empty()) {
        return Err(AppError::Validation("all fields are required".into()));
    }

    let email = normalize_handle(&form.email);
    let username = normalize_handle(&form.username);
    if !is_valid_email(&email) {
        warn!(%email, "invalid email");
        return Err(AppError::Validation("invalid email".into()));
    }
    if form.password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation("password too short".into()));
    }

    if User::exists_by_username_or_email(&state.db, &username, &email).await? {
        warn!(%email, %username, "user already exists");
        return Err(AppError::Conflict(
            "user with this email or username already exists".into(),
        ));
    }

    let Some(avatar_path) = form.avatar.as_deref() else {
        return Err(AppError::Validation("avatar file is required".into()));
    };

    let (fullname, password) = (form.fullname.as_str(), form.password.as_str());
    let (username, email) = (username.as_str(), email.as_str());
    let db = &state.db;
    let user = with_uploaded_media(
        &state.media,
        avatar_path,
        form.cover_image.as_deref(),
        move |avatar, cover_image| async move {
            let mut user = User::new(NewUser {
                username,
                email,
                fullname,
                avatar,
                cover_image,
                password,
            });
            user.save(db).await?;
            Ok::<User, AppError>(user)
        },
    )
    .await?;

    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok(user)
}

/// Upload the avatar and optional cover, then hand their URLs to `persist`.
/// Local spools are released after each successful upload. Objects already
/// in the store are deleted again if a later upload or `persist` fails.
async fn with_uploaded_media<T, F, Fut>(
    media: &MediaIngestor,
    avatar_path: &Path,
    cover_path: Option<&Path>,
    persist: F,
) -> Result<T>
where
    F: FnOnce(String, Option<String>) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let avatar = media.upload(Some(avatar_path)).await?;
    release_local(&avatar).await;

    let cover = match cover_path {
        Some(path) => match media.upload(Some(path)).await {
            Ok(res) => {
                release_local(&res).await;
                Some(res)
            }
            Err(e) => {
                forget_remote(media, &[&avatar]).await;
                return Err(e.into());
            }
        },
        None => None,
    };

    match persist(avatar.url.clone(), cover.as_ref().map(|c| c.url.clone())).await {
        Ok(value) => Ok(value),
        Err(e) => {
            let uploaded: Vec<&UploadResult> =
                std::iter::once(&avatar).chain(cover.as_ref()).collect();
            forget_remote(media, &uploaded).await;
            Err(e)
        }
    }
}

// The ingestor leaves the local file in place on success.
async fn release_local(res: &UploadResult) {
    if let Err(e) = res.discard_local().await {
        warn!(error = %e, path = %res.local_path.display(), "could not remove temp file");
    }
}

async fn forget_remote(media: &MediaIngestor, uploaded: &[&UploadResult]) {
    for res in uploaded {
        if let Err(e) = media.store().delete_object(&res.resource.key).await {
            warn!(error = %e, key = %res.resource.key, "could not delete orphaned object");
        }
    }
}

/// Issue a fresh token pair and persist the refresh token on the user.
async fn issue_tokens(state: &AppState, user: &mut User) -> Result<TokenPair> {
    let access_token = user.generate_access_token(&state.credentials)?;
    let refresh_token = user.generate_refresh_token(&state.credentials)?;
    user.refresh_token = Some(refresh_token.clone());
    user.save(&state.db).await?;
    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>> {
    let email = payload
        .email
        .as_deref()
        .map(normalize_handle)
        .filter(|v| !v.is_empty());
    let username = payload
        .username
        .as_deref()
        .map(normalize_handle)
        .filter(|v| !v.is_empty());
    if email.is_none() && username.is_none() {
        return Err(AppError::Validation("username or email is required".into()));
    }

    let Some(mut user) = User::find_by_login(&state.db, email.as_deref(), username.as_deref()).await?
    else {
        warn!(?email, ?username, "login unknown user");
        return Err(AppError::Unauthorized("invalid credentials".into()));
    };

    if !user.is_password_correct(&payload.password)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::Unauthorized("invalid credentials".into()));
    }

    let tokens = issue_tokens(&state, &mut user).await?;
    info!(user_id = %user.id, "user logged in");
    Ok(Json(ApiResponse::ok(
        StatusCode::OK,
        LoginResponse {
            user: PublicUser::from(&user),
            tokens,
        },
        "user logged in successfully",
    )))
}

#[instrument(skip(state, payload))]
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<ApiResponse<TokenPair>>> {
    let claims = state
        .credentials
        .verify_refresh_token(&payload.refresh_token)
        .map_err(|e| {
            warn!(error = %e, "refresh token rejected");
            AppError::Unauthorized("invalid refresh token".into())
        })?;

    let mut user = User::find_by_id(&state.db, claims.id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("invalid refresh token".into()))?;

    if user.refresh_token.as_deref() != Some(payload.refresh_token.as_str()) {
        warn!(user_id = %user.id, "stale refresh token presented");
        return Err(AppError::Unauthorized(
            "refresh token is expired or used".into(),
        ));
    }

    let tokens = issue_tokens(&state, &mut user).await?;
    Ok(Json(ApiResponse::ok(StatusCode::OK, tokens, "access token refreshed")))
}

#[instrument(skip(state))]
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<ApiResponse<serde_json::Value>>> {
    let mut user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("user not found".into()))?;
    user.refresh_token = None;
    user.save(&state.db).await?;

    info!(%user_id, "user logged out");
    Ok(Json(ApiResponse::ok(
        StatusCode::OK,
        serde_json::json!({}),
        "user logged out",
    )))
}

#[instrument(skip(state))]
pub async fn current_user(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<ApiResponse<PublicUser>>> {
    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("user not found".into()))?;
    Ok(Json(ApiResponse::ok(
        StatusCode::OK,
        PublicUser::from(&user),
        "current user fetched",
    )))
}

#[instrument(skip(state, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>> {
    if payload.new_password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation("password too short".into()));
    }

    let mut user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("user not found".into()))?;

    if !user.is_password_correct(&payload.old_password)? {
        warn!(%user_id, "change password with wrong old password");
        return Err(AppError::Validation("invalid old password".into()));
    }

    user.set_password(&payload.new_password);
    user.save(&state.db).await?;

    info!(%user_id, "password changed");
    Ok(Json(ApiResponse::ok(
        StatusCode::OK,
        serde_json::json!({}),
        "password changed successfully",
    )))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use super::*;
    use crate::media::ingestor::tests::FakeStore;

    fn spooled(dir: &tempfile::TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, b"pixels").unwrap();
        path
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@c.de"));
        assert!(!is_valid_email(""));
    }

    #[tokio::test]
    async fn incomplete_form_is_rejected_before_storage() {
        let state = AppState::fake();
        let form = RegisterForm {
            fullname: "Ada".into(),
            email: "ada@example.com".into(),
            username: "   ".into(),
            password: "long-enough".into(),
            ..RegisterForm::default()
        };
        let err = create_user(&state, &form).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn bad_email_and_short_password_are_rejected() {
        let state = AppState::fake();
        let mut form = RegisterForm {
            fullname: "Ada".into(),
            email: "not-an-email".into(),
            username: "ada".into(),
            password: "long-enough".into(),
            ..RegisterForm::default()
        };
        let err = create_user(&state, &form).await.unwrap_err();
        assert_eq!(err.to_string(), "invalid email");

        form.email = "ada@example.com".into();
        form.password = "short".into();
        let err = create_user(&state, &form).await.unwrap_err();
        assert_eq!(err.to_string(), "password too short");
    }

    #[tokio::test]
    async fn discard_files_removes_spooled_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let avatar = dir.path().join("a.png");
        std::fs::write(&avatar, b"png").unwrap();
        let form = RegisterForm {
            avatar: Some(avatar.clone()),
            cover_image: Some(dir.path().join("missing.png")),
            ..RegisterForm::default()
        };
        form.discard_files().await;
        assert!(!avatar.exists());
    }

    #[tokio::test]
    async fn repeated_file_field_removes_earlier_spool() {
        let dir = tempfile::tempdir().unwrap();
        let first = spooled(&dir, "first.png");
        let second = spooled(&dir, "second.png");

        let mut slot = None;
        keep_latest(&mut slot, first.clone()).await;
        assert!(first.exists());
        keep_latest(&mut slot, second.clone()).await;

        assert_eq!(slot.as_deref(), Some(second.as_path()));
        assert!(!first.exists());
        assert!(second.exists());
    }

    #[tokio::test]
    async fn media_is_stored_and_spools_released() {
        let store = Arc::new(FakeStore::default());
        let media = MediaIngestor::new(store.clone());
        let dir = tempfile::tempdir().unwrap();
        let avatar = spooled(&dir, "avatar.png");
        let cover = spooled(&dir, "cover.jpg");

        let (avatar_url, cover_url) = with_uploaded_media(
            &media,
            &avatar,
            Some(cover.as_path()),
            |avatar_url, cover_url| async move { Ok::<_, AppError>((avatar_url, cover_url)) },
        )
        .await
        .expect("register media");

        assert!(avatar_url.starts_with("https://fake.local/image/"));
        assert!(avatar_url.ends_with(".png"));
        assert!(cover_url.unwrap().ends_with(".jpg"));
        assert_eq!(store.puts.load(Ordering::SeqCst), 2);
        assert!(store.deleted.lock().unwrap().is_empty());
        assert!(!avatar.exists());
        assert!(!cover.exists());
    }

    #[tokio::test]
    async fn cover_failure_removes_stored_avatar() {
        let store = Arc::new(FakeStore::failing_after(1));
        let media = MediaIngestor::new(store.clone());
        let dir = tempfile::tempdir().unwrap();
        let avatar = spooled(&dir, "avatar.png");
        let cover = spooled(&dir, "cover.png");

        let mut persisted = false;
        let err = with_uploaded_media(&media, &avatar, Some(cover.as_path()), |_, _| {
            persisted = true;
            async { Ok::<(), AppError>(()) }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Upload(UploadError::Remote { .. })));
        assert!(!persisted);
        let deleted = store.deleted.lock().unwrap().clone();
        assert_eq!(deleted.len(), 1);
        assert!(deleted[0].starts_with("image/"));
        assert!(!avatar.exists());
        assert!(!cover.exists());
    }

    #[tokio::test]
    async fn avatar_failure_stores_nothing() {
        let store = Arc::new(FakeStore::failing());
        let media = MediaIngestor::new(store.clone());
        let dir = tempfile::tempdir().unwrap();
        let avatar = spooled(&dir, "avatar.png");

        let err = with_uploaded_media(&media, &avatar, None, |_, _| async {
            Ok::<(), AppError>(())
        })
        .await
        .unwrap_err();

        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert!(store.deleted.lock().unwrap().is_empty());
        assert!(!avatar.exists());
    }

    #[tokio::test]
    async fn failed_save_removes_every_stored_object() {
        let store = Arc::new(FakeStore::default());
        let media = MediaIngestor::new(store.clone());
        let dir = tempfile::tempdir().unwrap();
        let avatar = spooled(&dir, "avatar.png");
        let cover = spooled(&dir, "cover.webp");

        let err = with_uploaded_media(&media, &avatar, Some(cover.as_path()), |_, _| async {
            Err::<(), _>(AppError::Conflict("username taken".into()))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
        let mut deleted = store.deleted.lock().unwrap().clone();
        deleted.sort();
        assert_eq!(deleted.len(), 2);
        assert!(deleted.iter().all(|key| key.starts_with("image/")));
        assert!(deleted.iter().any(|key| key.ends_with(".png")));
        assert!(deleted.iter().any(|key| key.ends_with(".webp")));
        assert!(!avatar.exists());
        assert!(!cover.exists());
    }
}
