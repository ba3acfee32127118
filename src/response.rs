use serde::Serialize;

/// Success envelope: `{data}` or `{data, meta}` for lists.
#[derive(Debug, Serialize)]
pub struct Data<T> {
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<PageMeta>,
}

impl<T> Data<T> {
    pub fn new(data: T) -> Self {
        Self { data, meta: None }
    }

    pub fn paged(data: T, meta: PageMeta) -> Self {
        Self {
            data,
            meta: Some(meta),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub page: u32,
    pub total_data: i64,
    pub total_page: i64,
}
