use crate::core::domain::error::ValidationError;
use crate::core::domain::value_object::VM_ID_MAX;

/// Ids below this are left to administrators.
pub const DEFAULT_ID_FLOOR: u32 = 100_000;
const DEFAULT_MAX_ID_ATTEMPTS: u32 = 10;

/// Where clones go and how ids are allocated for them.
///
/// Storage and pool have no defaults; they come from the deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneConfig {
    /// Target storage for the clone's disks.
    pub storage: String,
    /// Resource pool the clone joins.
    pub pool: String,
    /// Smallest id the allocator may hand out.
    pub id_floor: u32,
    /// How many candidate ids may be refused before giving up.
    pub max_id_attempts: u32,
    /// Full copy (`true`) or linked clone.
    pub full_clone: bool,
    /// Name prefix of the clone, suffixed with its id.
    pub name_prefix: String,
}

impl CloneConfig {
    pub fn new(storage: impl Into<String>, pool: impl Into<String>) -> Result<Self, ValidationError> {
        let config = Self {
            storage: storage.into(),
            pool: pool.into(),
            id_floor: DEFAULT_ID_FLOOR,
            max_id_attempts: DEFAULT_MAX_ID_ATTEMPTS,
            full_clone: true,
            name_prefix: "vdi".to_string(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [("storage", &self.storage), ("pool", &self.pool)] {
            if value.trim().is_empty() {
                return Err(ValidationError::Field {
                    field: field.to_string(),
                    message: format!("Clone {} must be configured", field),
                });
            }
        }
        // At least two candidates must exist so a refused id can be replaced.
        if self.id_floor >= VM_ID_MAX {
            return Err(ValidationError::ConstraintViolation(format!(
                "Id floor must be below {}",
                VM_ID_MAX
            )));
        }
        if self.max_id_attempts == 0 {
            return Err(ValidationError::Field {
                field: "max_id_attempts".to_string(),
                message: "At least one attempt is required".to_string(),
            });
        }
        if !self
            .name_prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
            || self.name_prefix.is_empty()
        {
            return Err(ValidationError::Format(
                "Name prefix must be a non-empty DNS label".to_string(),
            ));
        }
        Ok(())
    }
}

/// Form body of `POST /nodes/{node}/qemu/{template}/clone`.
pub struct CloneRequest {
    pub newid: u32,
    pub name: String,
    pub storage: String,
    pub pool: String,
    pub full: bool,
}

impl CloneRequest {
    pub fn new(config: &CloneConfig, newid: u32) -> Self {
        Self {
            newid,
            name: format!("{}-{}", config.name_prefix, newid),
            storage: config.storage.clone(),
            pool: config.pool.clone(),
            full: config.full_clone,
        }
    }

    pub fn into_form(self) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("newid", self.newid.to_string()),
            ("name", self.name),
            ("pool", self.pool),
            ("full", u8::from(self.full).to_string()),
        ];
        // Storage may only be chosen for full clones.
        if self.full {
            form.push(("storage", self.storage));
        }
        form
    }
}
