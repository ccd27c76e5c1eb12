//! Fluent construction of local and peer-reflexive candidates.

use std::net::SocketAddr;

use crate::{candidate::Candidate, candidate_type::CandidateType, errors::IceError};

/// Local preference used when the builder is not given one.
pub const DEFAULT_LOCAL_PREFERENCE: u32 = 65535;

/// Builds a UDP [`Candidate`], computing its priority from the type and
/// local preference unless one is given explicitly.
#[derive(Debug, Clone)]
pub struct CandidateBuilder {
    foundation: Option<String>,
    component_id: u32,
    addr: Option<SocketAddr>,
    candidate_type: CandidateType,
    related: Option<SocketAddr>,
    local_preference: u32,
    priority: Option<u32>,
}

impl Default for CandidateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CandidateBuilder {
    pub fn new() -> Self {
        Self {
            foundation: None,
            // RTP; rtcp-mux is mandatory
            component_id: 1,
            addr: None,
            candidate_type: CandidateType::Host,
            related: None,
            local_preference: DEFAULT_LOCAL_PREFERENCE,
            priority: None,
        }
    }

    pub fn foundation(mut self, foundation: impl Into<String>) -> Self {
        self.foundation = Some(foundation.into());
        self
    }

    pub fn component_id(mut self, component_id: u32) -> Self {
        self.component_id = component_id;
        self
    }

    pub fn socket_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = Some(addr);
        self
    }

    pub fn candidate_type(mut self, candidate_type: CandidateType) -> Self {
        self.candidate_type = candidate_type;
        self
    }

    /// Base address of a reflexive or relayed candidate.
    pub fn related(mut self, related: SocketAddr) -> Self {
        self.related = Some(related);
        self
    }

    /// Clamped to 65535; higher is preferred.
    pub fn local_preference(mut self, local_preference: u32) -> Self {
        self.local_preference = local_preference.min(DEFAULT_LOCAL_PREFERENCE);
        self
    }

    /// Overrides the computed priority.
    pub fn priority(mut self, priority: u32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// # Returns
    /// * `Ok(Candidate)` - A validated candidate
    /// * `Err(IceError::MissingRequiredField)` - No foundation or address
    /// * `Err(IceError)` - The assembled candidate fails validation
    pub fn build(self) -> Result<Candidate, IceError> {
        let foundation = self
            .foundation
            .ok_or(IceError::MissingRequiredField("foundation"))?;
        let addr = self.addr.ok_or(IceError::MissingRequiredField("address"))?;
        let priority = self.priority.unwrap_or_else(|| {
            Candidate::calculate_priority(
                self.candidate_type.type_preference(),
                self.local_preference,
                self.component_id,
            )
        });

        let candidate = Candidate {
            foundation,
            component_id: self.component_id,
            transport: "UDP".to_string(),
            priority,
            address: addr.ip(),
            port: addr.port(),
            candidate_type: self.candidate_type,
            related_address: self.related.map(|r| r.ip()),
            related_port: self.related.map(|r| r.port()),
        };
        candidate.validate()?;
        Ok(candidate)
    }
}
