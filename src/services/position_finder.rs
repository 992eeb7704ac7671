//! 序数控件导航 - 业务能力层
//!
//! 控件只提供"前进 / 后退"和一个自由文本标签（例如 "Marzo 2024"），
//! 没有直接跳转的能力，也不告诉我们距离。因此这里是按方向的线性搜索：
//! 每次读取标签、解析出年月、向目标方向移动一步，直到命中或超过步数上限。

use crate::config::RetryPolicy;
use crate::driver::{Direction, UiDriver, WidgetRef};
use crate::error::{AppResult, ConfigError, NavigationError};
use crate::models::YearMonth;
use crate::services::retry::with_retry;
use phf::phf_map;
use regex::Regex;
use tracing::{debug, info, warn};

/// 月份全称（英语 / 西班牙语）
static LONG_MONTHS: phf::Map<&'static str, u32> = phf_map! {
    "january" => 1, "february" => 2, "march" => 3, "april" => 4,
    "may" => 5, "june" => 6, "july" => 7, "august" => 8,
    "september" => 9, "october" => 10, "november" => 11, "december" => 12,
    "enero" => 1, "febrero" => 2, "marzo" => 3, "abril" => 4,
    "mayo" => 5, "junio" => 6, "julio" => 7, "agosto" => 8,
    "septiembre" => 9, "setiembre" => 9, "octubre" => 10, "noviembre" => 11, "diciembre" => 12,
};

/// 月份缩写（英语 / 西班牙语）
static SHORT_MONTHS: phf::Map<&'static str, u32> = phf_map! {
    "jan" => 1, "feb" => 2, "mar" => 3, "apr" => 4, "jun" => 6, "jul" => 7,
    "aug" => 8, "sep" => 9, "sept" => 9, "oct" => 10, "nov" => 11, "dec" => 12,
    "ene" => 1, "abr" => 4, "ago" => 8, "set" => 9, "dic" => 12,
};

/// 控件标签解析器
pub struct LabelParser {
    year_re: Regex,
    month_number_re: Regex,
}

impl LabelParser {
    pub fn new() -> Result<Self, ConfigError> {
        Ok(Self {
            year_re: Regex::new(r"\b([0-9]{4})\b")?,
            month_number_re: Regex::new(r"\b(0?[1-9]|1[0-2])\b")?,
        })
    }

    /// 从标签中解析年月
    ///
    /// 年份必须是独立的 4 位数字；月份依次尝试全称、缩写、1-12 的数字，取第一个命中。
    /// 任何一项解析失败都返回 `LabelParse`，不做猜测。
    pub fn parse(&self, label: &str) -> Result<YearMonth, NavigationError> {
        let parse_error = || NavigationError::LabelParse {
            label: label.to_string(),
        };

        let year: i32 = self
            .year_re
            .captures(label)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
            .ok_or_else(parse_error)?;

        let month = self.parse_month(label).ok_or_else(parse_error)?;

        Ok(YearMonth::new(year, month))
    }

    fn parse_month(&self, label: &str) -> Option<u32> {
        let words: Vec<String> = label
            .split(|c: char| !c.is_alphabetic())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();

        if let Some(month) = words.iter().find_map(|w| LONG_MONTHS.get(w.as_str())) {
            return Some(*month);
        }
        if let Some(month) = words.iter().find_map(|w| SHORT_MONTHS.get(w.as_str())) {
            return Some(*month);
        }

        self.month_number_re
            .captures(label)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }
}

/// 序数控件导航器
pub struct PositionFinder {
    parser: LabelParser,
    max_steps: u32,
    retry: RetryPolicy,
}

impl PositionFinder {
    /// 最多移动 36 步（三年），配置只能调小
    pub const DEFAULT_MAX_STEPS: u32 = 36;

    pub fn new(max_steps: u32) -> AppResult<Self> {
        if max_steps > Self::DEFAULT_MAX_STEPS {
            warn!(
                "⚠️ 日历导航步数 {} 超过上限，使用 {}",
                max_steps,
                Self::DEFAULT_MAX_STEPS
            );
        }
        Ok(Self {
            parser: LabelParser::new()?,
            max_steps: max_steps.min(Self::DEFAULT_MAX_STEPS),
            retry: RetryPolicy::default(),
        })
    }

    /// 读取标签和点击箭头时使用的重试策略
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }

    /// 把控件移动到目标年月
    ///
    /// # 返回
    /// 返回实际移动的步数；已经在目标位置时为 0
    pub async fn navigate_to<D: UiDriver>(
        &self,
        driver: &D,
        portal: &D::Portal,
        widget: &WidgetRef,
        target: YearMonth,
    ) -> AppResult<u32> {
        let mut steps = 0;

        loop {
            let label = with_retry(&self.retry, "读取日历标签", || {
                driver.read_text(portal, &widget.label)
            })
            .await?;
            let current = self.parser.parse(&label)?;
            debug!(
                "日历当前显示 '{}' → {}，目标 {} (已移动 {} 步)",
                label.trim(),
                current,
                target,
                steps
            );

            if current == target {
                info!("✓ 日历已定位到 {}", target);
                return Ok(steps);
            }

            if steps >= self.max_steps {
                return Err(NavigationError::Timeout {
                    target: target.to_string(),
                    max_steps: self.max_steps,
                }
                .into());
            }

            let direction = if current.ordinal() > target.ordinal() {
                Direction::Retreat
            } else {
                Direction::Advance
            };
            with_retry(&self.retry, "移动日历", || {
                driver.advance_widget(portal, widget, direction)
            })
            .await?;
            steps += 1;
        }
    }
}
