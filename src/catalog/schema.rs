//! Catalog documents / 目录文档定义
//!
//! Statically declared document types for the SKU index and the catalog
//! upload status index.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::backend::{Analyzer, MemoryIndex};
use crate::error::{Result, SearchError};

/// Data completeness of a SKU / 商品数据完整度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkuQualityStatus {
    /// Every required field present
    #[serde(rename = "Completo")]
    Complete,
    #[serde(rename = "Incompleto")]
    Incomplete,
}

/// Overall status of a catalog upload / 目录上传状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CatalogUploadStatus {
    /// Every row loaded
    #[serde(rename = "Completo")]
    Complete,
    /// Some rows loaded
    #[serde(rename = "Incompleto")]
    Incomplete,
    /// The file is not a valid spreadsheet
    #[serde(rename = "Extensión inválida")]
    InvalidExtension,
    /// Valid spreadsheet with unexpected columns
    #[serde(rename = "Columnas del Excel no corresponden")]
    WrongColumns,
    #[serde(rename = "En proceso")]
    InProgress,
}

/// Row error category / 行错误类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkuErrorType {
    /// Not even the minimal fields are present
    #[serde(rename = "Fatal")]
    Fatal,
    #[serde(rename = "Falta información")]
    Missing,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkuImages {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub miniatura: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkuSpecifications {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ficha_tecnica: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_fabricante: Option<String>,
}

/// SKU document / 商品文档
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sku {
    /// Storage id, see [`Sku::build_sku_id`]
    pub sku_id: String,
    /// Seller's stock keeping unit / 商品编码
    pub sku: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku_fabricante: Option<String>,
    pub dv_proveedor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dv_fabricante: Option<String>,
    /// Provider tax id without check digit / 供应商税号
    pub rut_proveedor_: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rut_fabricante_: Option<i64>,
    pub contenido: String,
    pub formato_venta: String,
    pub unidad_medida: String,
    pub descripcion_corta: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descripcion_larga: Option<String>,
    /// Free-form attributes, vary per SKU
    #[serde(default)]
    pub atributos: Map<String, Value>,
    #[serde(default)]
    pub imagenes: SkuImages,
    /// Copy of `descripcion_corta` read by the suggesters
    pub descripcion_corta_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub especificaciones: Option<SkuSpecifications>,
    pub status: SkuQualityStatus,
}

impl Sku {
    /// `"{rut_proveedor_}_{sku}"` / 生成存储 ID
    pub fn build_sku_id(rut_proveedor_: i64, sku: &str) -> String {
        format!("{}_{}", rut_proveedor_, sku)
    }
}

/// Row-level upload error / 行错误
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkuErrors {
    /// Spreadsheet row of the faulty SKU
    pub row: i64,
    /// JSON text with the error detail
    pub sku_errors: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_error: Option<SkuErrorType>,
}

/// Catalog upload status document / 目录上传状态文档
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogUpload {
    pub client_id: String,
    pub rut_proveedor: String,
    pub file_hash: String,
    pub status: CatalogUploadStatus,
    #[serde(default)]
    pub incomplete_errors: Vec<SkuErrors>,
    #[serde(default)]
    pub fatal_errors: Vec<SkuErrors>,
}

/// Document stored with a caller-chosen `_id` / 可写入文档
pub trait Document: Serialize {
    /// Storage id; documents without one are rejected
    fn document_id(&self) -> Result<String>;

    /// Body sent as `_source` / 文档内容
    fn to_source(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Err(SearchError::validation("document does not serialize to an object")),
        }
    }
}

impl Document for Sku {
    fn document_id(&self) -> Result<String> {
        if self.sku_id.trim().is_empty() {
            return Err(SearchError::validation("sku_id is required"));
        }
        Ok(self.sku_id.clone())
    }
}

impl Document for CatalogUpload {
    fn document_id(&self) -> Result<String> {
        if self.file_hash.trim().is_empty() {
            return Err(SearchError::validation("file_hash is required"));
        }
        Ok(self.file_hash.clone())
    }
}

/// SKU index layout for the in-memory backend / 商品索引布局
pub fn sku_index_layout(name: &str) -> MemoryIndex {
    MemoryIndex::new(name)
        .field("sku_id", Analyzer::Standard)
        .field("sku", Analyzer::edge_ngram(3, 20))
        .field("sku_fabricante", Analyzer::edge_ngram(3, 20))
        .field("dv_proveedor", Analyzer::Standard)
        .field("dv_fabricante", Analyzer::Standard)
        .field("rut_proveedor_", Analyzer::Keyword)
        .field("rut_fabricante_", Analyzer::Keyword)
        .field("contenido", Analyzer::Standard)
        .field("formato_venta", Analyzer::Standard)
        .field("unidad_medida", Analyzer::Standard)
        .field("descripcion_corta", Analyzer::edge_ngram(2, 15))
        .field("descripcion_larga", Analyzer::Standard)
        .field("atributos", Analyzer::Standard)
        .field("imagenes", Analyzer::Standard)
        .field("descripcion_corta_", Analyzer::Standard)
        .field("especificaciones", Analyzer::Standard)
        .field("status", Analyzer::Standard)
        .strict()
}

/// Upload status index layout for the in-memory backend / 上传索引布局
pub fn upload_index_layout(name: &str) -> MemoryIndex {
    MemoryIndex::new(name)
        .field("client_id", Analyzer::Keyword)
        .field("rut_proveedor", Analyzer::Keyword)
        .field("file_hash", Analyzer::Keyword)
        .field("status", Analyzer::Standard)
        .field("incomplete_errors", Analyzer::Standard)
        .field("fatal_errors", Analyzer::Standard)
        .strict()
}
