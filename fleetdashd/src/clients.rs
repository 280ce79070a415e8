//! Request bodies for client and developer bookkeeping.
//!
//! Fields are optional at the decode layer; [`validate`](NewClientRequest::validate)
//! turns them into store inputs and rejects bad input before any query runs.

use fleetdash_common::validate::{ValidationError, require, validate_slug};
use serde::Deserialize;

use crate::errors::ApiError;
use crate::store::{NewClient, NewDev};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewClientRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
}

impl NewClientRequest {
    pub fn validate(&self) -> Result<NewClient, ValidationError> {
        let name = require("name", self.name.as_deref())?;
        let slug = validate_slug(require("slug", self.slug.as_deref())?)?;
        Ok(NewClient {
            name: name.to_string(),
            slug: slug.to_string(),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewDevRequest {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl NewDevRequest {
    pub fn validate(&self) -> Result<NewDev, ApiError> {
        let name = require("name", self.name.as_deref())?;
        let email = self
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(|e| {
                if e.contains('@') && !e.starts_with('@') && !e.ends_with('@') {
                    Ok(e.to_string())
                } else {
                    Err(ApiError::invalid("email", format!("'{e}' is not an email address")))
                }
            })
            .transpose()?;
        Ok(NewDev {
            name: name.to_string(),
            email,
        })
    }
}

/// Body of the assign and unassign endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DevAssignment {
    pub dev_id: Option<i64>,
}

impl DevAssignment {
    pub fn dev_id(&self) -> Result<i64, ApiError> {
        match self.dev_id {
            Some(id) if id > 0 => Ok(id),
            Some(id) => Err(ApiError::invalid("dev_id", format!("{id} is not a valid id"))),
            None => Err(ValidationError::Missing { field: "dev_id" }.into()),
        }
    }
}
