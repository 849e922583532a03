use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey,
                   Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;

/// Room grant: `sub` may join `room` until `exp`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims { pub sub:String, pub name:String, pub room:String, pub exp:i64 }

pub fn sign(identity:&str, name:&str, room:&str, ttl_secs:i64, secret:&str) -> AppResult<String> {
    let c = Claims {
        sub:  identity.into(),
        name: name.into(),
        room: room.into(),
        exp:  Utc::now().timestamp() + ttl_secs,
    };
    Ok(encode(&Header::default(), &c, &EncodingKey::from_secret(secret.as_bytes()))?)
}

pub fn verify(token:&str, secret:&str) -> AppResult<Claims> {
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()),
                                &Validation::new(Algorithm::HS256))?;
    Ok(data.claims)
}
