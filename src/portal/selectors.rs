//! Element locators for the vendor order portal.
//!
//! The portal is an ExtJS application, so most ids are generated and will
//! change whenever the vendor reorders the page.

use thirtyfour::By;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locator {
    Id(&'static str),
    Name(&'static str),
    Css(&'static str),
    XPath(&'static str),
    ClassName(&'static str),
}

impl Locator {
    pub fn by(&self) -> By {
        match *self {
            Locator::Id(id) => By::Id(id),
            Locator::Name(name) => By::Name(name),
            Locator::Css(css) => By::Css(css),
            Locator::XPath(xpath) => By::XPath(xpath),
            Locator::ClassName(class) => By::ClassName(class),
        }
    }

    /// Human-readable form for logs and timeout errors
    pub fn describe(&self) -> String {
        match self {
            Locator::Id(v) => format!("#{}", v),
            Locator::Name(v) => format!("[name={}]", v),
            Locator::Css(v) | Locator::ClassName(v) | Locator::XPath(v) => v.to_string(),
        }
    }
}

// Login page
pub const OPERATOR_CODE: Locator = Locator::Name("OPCD");
pub const PASSWORD: Locator = Locator::Name("PSWD");
pub const LOGIN_BUTTON: Locator = Locator::XPath("//button[text()='ログイン']");

// Menu; the order application opens in a second window
pub const ORDER_APP_TILE: Locator = Locator::Css(".tail_item_row_1:nth-child(6)");
pub const MENU_BUTTON: Locator = Locator::Id("button-1041-btnIconEl");
pub const ORDER_MENU: Locator = Locator::XPath("//span[text()='発注']");
pub const BULK_ENTRY_ITEM: Locator = Locator::Id("menuitem-1049");

// Bulk entry
pub const FILE_INPUT: Locator = Locator::Id("filefield-1495-button-fileInputEl");
pub const IMPORT_BUTTON: Locator = Locator::Id("ext-comp-1483cmdExec-btnIconEl");
pub const CONFIRM_BUTTON: Locator = Locator::Id("button-1006-btnIconEl");
/// Panel shown when the portal rejects rows of the sheet
pub const INPUT_ERROR_PANEL: Locator = Locator::Id("component-1002");

// Results grid
pub const ROW_CHECKER: Locator = Locator::ClassName("x-grid-row-checker");
pub const CSV_LABEL: Locator = Locator::XPath("//label[text()='CSV']");
pub const EXPORT_BUTTON: Locator = Locator::XPath("//span[text()='出力指示']");
