//! 门户页面结构
//!
//! 查询表单、日历控件和"已导出查询"列表的选择器集中在这里。

use crate::driver::{ElementRef, WidgetRef};
use crate::services::FeedLayout;
use chrono::NaiveDate;

/// 门户首页上的服务入口
pub const SERVICE_TILE: &str = "a[title='mis_retenciones']";

// ========== 查询表单 ==========

pub const TAX_SELECT: &str = "#selectImpuestos";
pub const DATE_FROM_INPUT: &str = "#datePickerFechasRetencionesDesde__input";
pub const DATE_TO_INPUT: &str = "#datePickerFechasRetencionesHasta__input";
pub const CALENDAR_PANE: &str = ".vc-pane-container";
pub const CONSULT_BUTTON: &str = "#btnConsultarRetenciones";
pub const EXPORT_BUTTON: &str = "#btnExportarOtrosFormatos";
pub const EXPORT_MENU_ITEM: &str = ".dropdown-menu a.dropdown-item";
pub const EXPORT_MODAL_OK: &str = "#modal-sinresultados_btnOK";
pub const EXPORTED_TAB: &str =
    "button#tabConsultasExportdas-tab, button[aria-controls='tabConsultasExportdas']";
pub const NEW_QUERY_TAB: &str =
    "button#tabNuevaConsulta-tab, button[aria-controls='tabNuevaConsulta']";

// ========== 导出列表 ==========

const FIRST_ROW: &str = ".ag-row[row-index='0']";

/// 税种下拉选项，例如 `IMP_217`
pub fn tax_option(code: &str) -> ElementRef {
    ElementRef::css(format!("#selectImpuestos-multiselect-option-{}", code))
}

/// 操作类型单选框
pub fn operation_radio(value: &str) -> ElementRef {
    ElementRef::css(format!("input[type='radio'][value='{}']", value))
}

/// "CSV" 导出菜单项
pub fn csv_option() -> ElementRef {
    ElementRef::with_text(EXPORT_MENU_ITEM, ".CSV")
}

/// 日期选择器的月份导航
pub fn calendar_widget() -> WidgetRef {
    WidgetRef {
        label: ElementRef::css(".vc-title"),
        retreat: ElementRef::css(".vc-arrow.is-left"),
        advance: ElementRef::css(".vc-arrow.is-right"),
    }
}

/// 日历中的某一天
pub fn calendar_day(date: NaiveDate) -> ElementRef {
    ElementRef::css(format!(".vc-day.id-{}", date.format("%Y-%m-%d")))
}

/// "已导出查询"列表
pub fn exported_feed() -> FeedLayout {
    let cell = |col: &str| ElementRef::css(format!("{} [col-id='{}']", FIRST_ROW, col));
    FeedLayout {
        refresh: ElementRef::css("#btnRecargarTablaAplicativo"),
        first_row: ElementRef::css(FIRST_ROW),
        tag_cell: cell("filtros"),
        status_cell: cell("estado"),
        timestamp_cell: cell("fechaTimestamp"),
        download_link: ElementRef::css(format!("{} a[download]", FIRST_ROW)),
    }
}
