//! 测试用的内存 UI 驱动
//!
//! 模拟门户的日历控件和"已导出查询"列表，并记录所有调用。

#![allow(dead_code)]

use chrono::Local;
use retenciones_export::config::{CorrelationPolicy, RetryPolicy};
use retenciones_export::driver::{ArtifactHandle, Direction, ElementRef, UiDriver, WidgetRef};
use retenciones_export::error::{DriverError, DriverResult};
use retenciones_export::models::{
    Catalog, CatalogEntry, DateRange, OperationMode, Secret, WorkPlan,
};
use retenciones_export::services::PositionFinder;
use retenciones_export::workflow::selectors;
use retenciones_export::{ExportFlow, StopSignal};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

pub const LOGIN_ID: &str = "20111111112";
pub const TARGET_ID: &str = "30500010912";

const MONTHS: [&str; 12] = [
    "Enero", "Febrero", "Marzo", "Abril", "Mayo", "Junio", "Julio", "Agosto", "Septiembre",
    "Octubre", "Noviembre", "Diciembre",
];

/// 导出列表的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRow {
    pub tag: String,
    pub status: String,
    pub timestamp: String,
}

impl FeedRow {
    pub fn new(tag: &str, status: &str, timestamp: &str) -> Self {
        Self {
            tag: tag.to_string(),
            status: status.to_string(),
            timestamp: timestamp.to_string(),
        }
    }
}

#[derive(Default)]
pub struct FakeState {
    pub calls: Vec<String>,
    /// 日历当前位置（year * 12 + month）
    pub calendar: i64,
    /// 日历按钮失效
    pub calendar_stuck: bool,
    pub advances: u32,
    /// 接下来 N 次读取日历标签时找不到元素
    pub flaky_label_reads: u32,
    /// 接下来 N 次点击日历箭头时找不到元素
    pub flaky_advances: u32,
    /// 当前选中的税种
    pub selected_key: Option<String>,
    /// 预设的列表内容：每次刷新取下一行；为空时保持最后一行
    pub scripted_feed: VecDeque<Option<FeedRow>>,
    /// 没有预设内容时，导出 CSV 后第一行自动变为当前税种的完成记录
    pub current_row: Option<FeedRow>,
    pub refreshes: u32,
    pub downloads: usize,
    /// 这些税种的下载永远超时
    pub broken_downloads: Vec<String>,
    /// 选择该税种时会话丢失
    pub lose_session_on: Option<String>,
    /// 刷新导出列表时会话丢失
    pub lose_session_on_refresh: bool,
    /// 第 N 次下载成功后请求停止
    pub stop_after_downloads: Option<(usize, StopSignal)>,
    pub login_rejected: bool,
}

pub struct FakeDriver {
    pub state: RefCell<FakeState>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::with_state(FakeState {
            calendar: 2025 * 12 + 6,
            ..FakeState::default()
        })
    }

    pub fn with_state(state: FakeState) -> Self {
        Self {
            state: RefCell::new(state),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn log(&self, call: String) {
        self.state.borrow_mut().calls.push(call);
    }

    fn calendar_label(&self) -> String {
        let ordinal = self.state.borrow().calendar;
        let year = (ordinal - 1).div_euclid(12);
        let month = (ordinal - 1).rem_euclid(12) as usize;
        format!("{} {}", MONTHS[month], year)
    }

    fn feed_cell(&self, css: &str) -> DriverResult<String> {
        let feed = selectors::exported_feed();
        let state = self.state.borrow();
        let row = state
            .current_row
            .as_ref()
            .ok_or_else(|| DriverError::element_not_found(css))?;
        if css == feed.tag_cell.css {
            Ok(row.tag.clone())
        } else if css == feed.status_cell.css {
            Ok(row.status.clone())
        } else if css == feed.timestamp_cell.css {
            Ok(row.timestamp.clone())
        } else {
            Ok(format!("{} {} {}", row.tag, row.status, row.timestamp))
        }
    }

    fn on_refresh(&self) {
        let mut state = self.state.borrow_mut();
        state.refreshes += 1;
        if let Some(next) = state.scripted_feed.pop_front() {
            state.current_row = next;
        }
    }

    fn on_export(&self) {
        let mut state = self.state.borrow_mut();
        if !state.scripted_feed.is_empty() {
            return;
        }
        let tag = state
            .selected_key
            .as_deref()
            .and_then(|k| k.split_once('_').map(|(_, t)| t.to_string()))
            .unwrap_or_default();
        state.current_row = Some(FeedRow::new(
            &format!("Impuesto: {}", tag),
            "Finalizado",
            &now_text(),
        ));
    }
}

impl UiDriver for FakeDriver {
    type Session = String;
    type Portal = ();

    async fn open_session(&self, session_id: &str) -> DriverResult<String> {
        self.log(format!("open_session:{}", session_id));
        Ok(session_id.to_string())
    }

    async fn login(&self, _session: &String, identity: &str, secret: &Secret) -> DriverResult<()> {
        self.log(format!("login:{}", identity));
        if self.state.borrow().login_rejected {
            return Err(DriverError::LoginFailed {
                identity: identity.to_string(),
                reason: format!("clave {} incorrecta", secret.expose()),
            });
        }
        Ok(())
    }

    async fn open_service(
        &self,
        _session: &String,
        _portal: &(),
        tile: &ElementRef,
    ) -> DriverResult<()> {
        self.log(format!("open_service:{}", tile.css));
        Ok(())
    }

    async fn select_target(&self, _portal: &(), target_identity: &str) -> DriverResult<()> {
        self.log(format!("select_target:{}", target_identity));
        Ok(())
    }

    async fn fill_field(&self, _portal: &(), field: &ElementRef, value: &str) -> DriverResult<()> {
        self.log(format!("fill:{}={}", field.css, value));
        Ok(())
    }

    async fn click(&self, _portal: &(), element: &ElementRef) -> DriverResult<()> {
        self.log(format!("click:{}", element.css));
        let css = element.css.as_str();

        if let Some(key) = css.strip_prefix("#selectImpuestos-multiselect-option-") {
            let mut state = self.state.borrow_mut();
            if state.lose_session_on.as_deref() == Some(key) {
                return Err(DriverError::SessionLost {
                    reason: "browser closed".to_string(),
                });
            }
            state.selected_key = Some(key.to_string());
        } else if css == selectors::exported_feed().refresh.css {
            if self.state.borrow().lose_session_on_refresh {
                return Err(DriverError::SessionLost {
                    reason: "target closed".to_string(),
                });
            }
            self.on_refresh();
        } else if css == selectors::EXPORT_MENU_ITEM {
            self.on_export();
        } else if css == selectors::EXPORT_MODAL_OK {
            return Err(DriverError::element_not_found(css));
        }
        Ok(())
    }

    async fn read_text(&self, _portal: &(), element: &ElementRef) -> DriverResult<String> {
        let css = element.css.as_str();
        if css == selectors::calendar_widget().label.css {
            {
                let mut state = self.state.borrow_mut();
                if state.flaky_label_reads > 0 {
                    state.flaky_label_reads -= 1;
                    return Err(DriverError::element_not_found(css));
                }
            }
            return Ok(self.calendar_label());
        }
        if css == selectors::CALENDAR_PANE {
            return Ok(String::new());
        }
        self.feed_cell(css)
    }

    async fn advance_widget(
        &self,
        _portal: &(),
        widget: &WidgetRef,
        direction: Direction,
    ) -> DriverResult<()> {
        let mut state = self.state.borrow_mut();
        if state.flaky_advances > 0 {
            state.flaky_advances -= 1;
            return Err(DriverError::element_not_found(widget.advance.css.as_str()));
        }
        state.advances += 1;
        if !state.calendar_stuck {
            match direction {
                Direction::Advance => state.calendar += 1,
                Direction::Retreat => state.calendar -= 1,
            }
        }
        Ok(())
    }

    async fn trigger_download(
        &self,
        _portal: &(),
        element: &ElementRef,
        timeout: std::time::Duration,
    ) -> DriverResult<ArtifactHandle> {
        self.log(format!("download:{}", element.css));
        let mut state = self.state.borrow_mut();
        let key = state.selected_key.clone().unwrap_or_default();
        if state.broken_downloads.contains(&key) {
            return Err(DriverError::DownloadTimeout {
                element: element.css.clone(),
                timeout_secs: timeout.as_secs(),
            });
        }

        state.downloads += 1;
        if let Some((after, stop)) = &state.stop_after_downloads {
            if state.downloads >= *after {
                stop.request();
            }
        }
        Ok(ArtifactHandle {
            suggested_name: Some(format!("{}.csv", key)),
            bytes: format!("csv for {}", key).into_bytes(),
        })
    }

    async fn save_artifact(&self, artifact: &ArtifactHandle, path: &Path) -> DriverResult<()> {
        self.log(format!("save:{}", path.display()));
        let io_error = |source| DriverError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        std::fs::write(path, &artifact.bytes).map_err(io_error)
    }

    async fn close_session(&self, session: String, retain_workspace: bool) -> DriverResult<()> {
        self.log(format!("close_session:{}:retain={}", session, retain_workspace));
        Ok(())
    }
}

/// 三个事项的小目录（其中 IMP_219 有两个变体）
pub fn small_catalog() -> Catalog {
    use OperationMode::*;

    Catalog::new(vec![
        CatalogEntry::new("IMP_172", "172 - IMPUESTO TRANSF DE INMUEBLES", "Impositivas", Retencion),
        CatalogEntry::new(
            "IMP_219",
            "219 - SICORE-IMPTO.S/ BS PERSONALES",
            "Impositivas",
            AmbasSeparadas,
        ),
        CatalogEntry::new("ADU_767", "767 - SICORE - RETENCIONES Y PERCEPC", "Aduaneras", FechaSolo),
    ])
}

pub fn small_plan() -> WorkPlan {
    let range = DateRange::parse("01/01/2024", "31/03/2024").unwrap();
    WorkPlan::batch(&small_catalog(), range, LOGIN_ID, TARGET_ID).unwrap()
}

/// 不等待的轮询策略；轮询间隔为 0 时每分钟 60 次
pub fn fast_correlation(max_wait_minutes: u64) -> CorrelationPolicy {
    CorrelationPolicy {
        poll_interval: Duration::ZERO,
        initial_delay: Duration::ZERO,
        max_wait_minutes,
        tolerance_minutes: 5,
        download_timeout: Duration::from_secs(1),
    }
}

pub fn fast_flow(output_dir: &Path) -> ExportFlow {
    ExportFlow::with_policies(
        PositionFinder::new(PositionFinder::DEFAULT_MAX_STEPS).unwrap(),
        RetryPolicy::immediate(2),
        fast_correlation(1),
        output_dir.to_path_buf(),
    )
}

pub fn secret() -> Secret {
    Secret::new("s3cr3t-clave").unwrap()
}

/// 当前时间，格式与门户列表一致
pub fn now_text() -> String {
    Local::now().format("%d/%m/%Y %H:%M").to_string()
}
