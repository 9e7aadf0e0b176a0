//! Authenticated actors
//!
//! Tokens are issued by the external identity provider; this service only
//! validates them and turns their claims into a trusted [`Actor`].

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::enums::{text_enum, BorrowerType};
use crate::error::AppError;

text_enum! {
    Role {
        Admin => "admin",
        Faculty => "faculty",
        Student => "student",
    }
}

/// Trusted identity of the caller of an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Actor {
    pub id: i32,
    pub role: Role,
    pub name: String,
    pub email: String,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Authorization("Administrator privileges required".to_string()))
        }
    }

    /// Administrators and faculty
    pub fn require_staff(&self) -> Result<(), AppError> {
        match self.role {
            Role::Admin | Role::Faculty => Ok(()),
            Role::Student => Err(AppError::Authorization("Staff privileges required".to_string())),
        }
    }

    /// Borrower category used when this actor borrows for themselves
    pub fn borrower_type(&self) -> BorrowerType {
        match self.role {
            Role::Student => BorrowerType::Student,
            Role::Faculty | Role::Admin => BorrowerType::Faculty,
        }
    }
}

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    /// User id
    pub sub: i32,
    pub role: Role,
    pub name: String,
    pub email: String,
    pub exp: i64,
    pub iat: i64,
}

impl UserClaims {
    /// Create a new JWT token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse JWT token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    pub fn into_actor(self) -> Actor {
        Actor {
            id: self.sub,
            role: self.role,
            name: self.name,
            email: self.email,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip() {
        let now = chrono::Utc::now().timestamp();
        let claims = UserClaims {
            sub: 7,
            role: Role::Faculty,
            name: "Ada".to_string(),
            email: "ada@lab.test".to_string(),
            exp: now + 3600,
            iat: now,
        };
        let token = claims.create_token("secret").unwrap();
        let actor = UserClaims::from_token(&token, "secret").unwrap().into_actor();
        assert_eq!(actor.id, 7);
        assert_eq!(actor.role, Role::Faculty);
        assert!(UserClaims::from_token(&token, "other").is_err());
    }

    #[test]
    fn test_admin_borrows_as_faculty() {
        let actor = Actor {
            id: 1,
            role: Role::Admin,
            name: "Root".to_string(),
            email: "root@lab.test".to_string(),
        };
        assert!(actor.require_admin().is_ok());
        assert_eq!(actor.borrower_type(), BorrowerType::Faculty);
    }
}
