//! Request descriptors and the attributes they carry.

use serde::{Deserialize, Serialize};

/// One of the attributes a descriptor or rule can carry.
///
/// The variant order is the order in which fields contribute to counter keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorField {
    AccountId,
    ClientIp,
    RequestType,
}

impl DescriptorField {
    /// All fields, in key order.
    pub const ALL: [DescriptorField; 3] = [
        DescriptorField::AccountId,
        DescriptorField::ClientIp,
        DescriptorField::RequestType,
    ];

    /// The label used for this field inside counter keys.
    pub fn label(&self) -> &'static str {
        match self {
            DescriptorField::AccountId => "accountId",
            DescriptorField::ClientIp => "clientIp",
            DescriptorField::RequestType => "requestType",
        }
    }
}

/// The attributes identifying the caller of a single request.
///
/// Every attribute is optional. An empty string is treated the same as an
/// absent attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_type: Option<String>,
}

impl RequestDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn with_client_ip(mut self, client_ip: impl Into<String>) -> Self {
        self.client_ip = Some(client_ip.into());
        self
    }

    pub fn with_request_type(mut self, request_type: impl Into<String>) -> Self {
        self.request_type = Some(request_type.into());
        self
    }

    /// Raw value of a field, as supplied by the caller.
    pub fn field(&self, field: DescriptorField) -> Option<&str> {
        match field {
            DescriptorField::AccountId => self.account_id.as_deref(),
            DescriptorField::ClientIp => self.client_ip.as_deref(),
            DescriptorField::RequestType => self.request_type.as_deref(),
        }
    }

    /// Value of a field if it was supplied and is non-empty.
    pub fn present(&self, field: DescriptorField) -> Option<&str> {
        self.field(field).filter(|v| !v.is_empty())
    }

    /// Present fields in key order.
    pub fn present_fields(&self) -> impl Iterator<Item = (DescriptorField, &str)> + '_ {
        DescriptorField::ALL
            .into_iter()
            .filter_map(move |f| self.present(f).map(|v| (f, v)))
    }
}

impl std::fmt::Display for RequestDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries: Vec<String> = self
            .present_fields()
            .map(|(field, value)| format!("{}={}", field.label(), value))
            .collect();
        write!(f, "{{{}}}", entries.join(","))
    }
}
