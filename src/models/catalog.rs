//! 税种目录
//!
//! 内置 16 个条目，顺序固定；也可以从 TOML 文件加载自定义目录。

use crate::models::work_item::OperationMode;
use serde::{Deserialize, Serialize};

/// 目录条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// 唯一编码，例如 `IMP_217`
    pub code: String,
    /// 显示名称，例如 `217 - SICORE-IMPTO.A LAS GANANCIAS`
    pub name: String,
    /// 分类：Impositivas / Seguridad Social / Aduaneras / Certificados SIRE
    pub category: String,
    pub mode: OperationMode,
}

impl CatalogEntry {
    pub fn new(code: &str, name: &str, category: &str, mode: OperationMode) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            category: category.to_string(),
            mode,
        }
    }
}

/// 有序目录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    /// 内置目录
    pub fn builtin() -> Self {
        use OperationMode::*;

        #[rustfmt::skip]
        let entries = vec![
            // Impositivas
            CatalogEntry::new("IMP_172", "172 - IMPUESTO TRANSF DE INMUEBLES", "Impositivas", Retencion),
            CatalogEntry::new("IMP_216", "216 - SIRE - IVA", "Impositivas", Retencion),
            CatalogEntry::new("IMP_217", "217 - SICORE-IMPTO.A LAS GANANCIAS", "Impositivas", Ambas),
            CatalogEntry::new("IMP_218", "218 - IMP.A LAS GAN.- BENEF.DEL EXT.", "Impositivas", Retencion),
            CatalogEntry::new("IMP_219", "219 - SICORE-IMPTO.S/ BS PERSONALES", "Impositivas", AmbasSeparadas),
            CatalogEntry::new("IMP_222", "222 - DONACIONES Y OTRO TIPO DE LIB.", "Impositivas", Retencion),
            CatalogEntry::new("IMP_466", "466 - SICORE-PREMIOS JUEGOS Y C.DEP", "Impositivas", Retencion),
            CatalogEntry::new("IMP_767", "767 - SICORE - RETENCIONES Y PERCEPC", "Impositivas", Ambas),
            CatalogEntry::new("IMP_787", "787 - RET ART 79 LEY GCIAS INC A,ByC", "Impositivas", Retencion),
            CatalogEntry::new("IMP_939", "939 - PERCEPCION IMPUESTO PAIS", "Impositivas", Percepcion),
            // Seguridad Social
            CatalogEntry::new("SS_353", "353 - RETENCIONES CONTRIB.SEG.SOCIAL", "Seguridad Social", Ambas),
            // Aduaneras
            CatalogEntry::new("ADU_217", "217 - SICORE-IMPTO.A LAS GANANCIAS", "Aduaneras", FechaSolo),
            CatalogEntry::new("ADU_767", "767 - SICORE - RETENCIONES Y PERCEPC", "Aduaneras", FechaSolo),
            // Certificados SIRE
            CatalogEntry::new("SIR_216", "216 - SIRE - IVA", "Certificados SIRE", Retencion),
            CatalogEntry::new("SIR_218", "218 - IMP.A LAS GAN.- BENEF.DEL EXT.", "Certificados SIRE", Retencion),
            CatalogEntry::new("SIR_353", "353 - RETENCIONES CONTRIB.SEG.SOCIAL", "Certificados SIRE", Ambas),
        ];

        Self { entries }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn get(&self, code: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.code == code)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}
