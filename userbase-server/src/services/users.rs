use crate::db::repos::{DbError, User, UserRepo};

/// Pass-through user operations
pub struct UserService<'a> {
    repo: UserRepo<'a>,
}

impl<'a> UserService<'a> {
    pub fn new(repo: UserRepo<'a>) -> Self {
        Self { repo }
    }

    pub async fn list(&self) -> Result<Vec<User>, DbError> {
        self.repo.list().await
    }

    pub async fn create(&self, name: &str, email: &str) -> Result<User, DbError> {
        self.repo.create(name, email).await
    }

    pub async fn get(&self, id: i64) -> Result<User, DbError> {
        self.repo.get(id).await
    }
}
