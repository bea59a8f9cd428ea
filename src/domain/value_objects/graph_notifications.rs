use serde::Deserialize;

/// Envelope delivered to the webhook endpoint by Microsoft Graph.
/// Unknown fields are ignored; Graph adds properties between API versions.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphNotificationBatch {
    #[serde(default)]
    pub value: Vec<NotificationValue>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationValue {
    pub subscription_id: Option<String>,
    pub client_state: Option<String>,
    pub resource: Option<String>,
    pub resource_data: Option<ResourceData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceData {
    #[serde(rename = "@odata.type")]
    pub odata_type: Option<String>,
    #[serde(rename = "@odata.id")]
    pub odata_id: Option<String>,
    pub id: Option<String>,
}
