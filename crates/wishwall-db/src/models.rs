/// Database row types: these map directly to SQLite rows.
/// Distinct from wishwall-types API models to keep the DB layer independent.
/// Timestamps are SQLite `datetime('now')` strings.

pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    pub password: String,
    pub is_active: bool,
    pub is_admin: bool,
    pub created_at: String,
}

pub struct WallRow {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub unique_url: String,
    pub passcode: String,
    pub is_public: bool,
    pub admin_id: i64,
    pub created_at: String,
    pub updated_at: Option<String>,
}

pub struct ContributorRow {
    pub id: i64,
    pub email: String,
    pub wall_id: i64,
    pub is_active: bool,
    pub invite_token: String,
    pub invited_at: String,
    pub accepted_at: Option<String>,
}

pub struct ContentRow {
    pub id: i64,
    pub wall_id: i64,
    pub contributor_id: i64,
    pub content_type: String,
    pub text: Option<String>,
    pub image_url: Option<String>,
    pub image_urls: Option<Vec<String>>,
    pub author_name: Option<String>,
    pub created_at: String,
}

impl ContentRow {
    /// Every stored image this post references, single or multi.
    pub fn stored_images(&self) -> Vec<String> {
        self.image_url
            .iter()
            .chain(self.image_urls.iter().flatten())
            .cloned()
            .collect()
    }
}

/// Fields for a new wall; the slug is chosen inside the insert transaction.
pub struct NewWall<'a> {
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub passcode: &'a str,
    pub admin_id: i64,
}

pub struct NewContent<'a> {
    pub wall_id: i64,
    pub contributor_id: i64,
    pub content_type: &'a str,
    pub text: Option<&'a str>,
    pub image_url: Option<&'a str>,
    pub image_urls: Option<&'a [String]>,
    pub author_name: Option<&'a str>,
}

/// Partial wall update; `None` leaves the column untouched.
#[derive(Default)]
pub struct WallChanges<'a> {
    pub title: Option<&'a str>,
    pub description: Option<&'a str>,
    pub is_public: Option<bool>,
}
