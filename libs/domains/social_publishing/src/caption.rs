//! Caption rendering.
//!
//! Two Handlebars templates, selected by the triggering event. Escaping is
//! disabled: captions are plain text, not HTML.

use crate::error::{PublishError, PublishResult};
use crate::models::{Product, PublishTrigger};
use handlebars::Handlebars;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

const NEW_PRODUCT_TEMPLATE: &str = "\
🔥 NEW DROP! A new shoe is now available! 🔥
{{title}}
{{#if sizes}}
Available sizes:
{{sizes}}
{{/if}}
Check it out on: {{link}}
For inquiries, DM us on Facebook or Instagram!

#sidestep #sneakers #kicks";

const NEW_PHOTOS_TEMPLATE: &str = "\
📸 Fresh photos just dropped! 📸
{{title}}
{{#if sizes}}
Available sizes:
{{sizes}}
{{/if}}
See every angle on: {{link}}
For inquiries, DM us on Facebook or Instagram!

#sidestep #sneakers #kicks";

#[derive(Debug, Serialize)]
struct CaptionData<'a> {
    title: String,
    sizes: String,
    link: &'a str,
}

/// `5000` → `5000`, `4999.5` → `4999.50`
pub fn format_price(price: Decimal) -> String {
    if price.fract().is_zero() {
        price.trunc().normalize().to_string()
    } else {
        format!("{:.2}", price.round_dp(2))
    }
}

/// One `"<size> (<stock>) - <currency><price>"` line per size, in catalog order.
pub fn size_lines(product: &Product, currency: &str) -> String {
    product
        .sizes
        .iter()
        .map(|size| {
            format!(
                "{} ({}) - {}{}",
                size.size,
                size.stock,
                currency,
                format_price(size.effective_price(product.base_price))
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Renders post captions for catalog events.
#[derive(Clone)]
pub struct CaptionEngine {
    handlebars: Arc<Handlebars<'static>>,
    currency: String,
}

impl CaptionEngine {
    pub fn new(currency: impl Into<String>) -> PublishResult<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars.set_strict_mode(true);

        handlebars
            .register_template_string("new_product", NEW_PRODUCT_TEMPLATE)
            .map_err(|e| PublishError::Caption(format!("Failed to register new_product: {}", e)))?;
        handlebars
            .register_template_string("new_photos", NEW_PHOTOS_TEMPLATE)
            .map_err(|e| PublishError::Caption(format!("Failed to register new_photos: {}", e)))?;

        Ok(Self {
            handlebars: Arc::new(handlebars),
            currency: currency.into(),
        })
    }

    /// Render the caption for `product`, linking to `link`.
    pub fn render(&self, trigger: PublishTrigger, product: &Product, link: &str) -> PublishResult<String> {
        let template = match trigger {
            PublishTrigger::ProductCreated => "new_product",
            PublishTrigger::ImageAdded => "new_photos",
        };
        debug!(product_id = product.id, template, "Rendering caption");

        let title = format!("{} {}", product.brand.trim(), product.name.trim())
            .trim()
            .to_string();
        let data = CaptionData {
            title,
            sizes: size_lines(product, &self.currency),
            link,
        };
        Ok(self.handlebars.render(template, &data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProductSize;
    use rust_decimal_macros::dec;

    fn product(sizes: Vec<ProductSize>) -> Product {
        Product {
            id: 42,
            brand: "Nike".into(),
            name: "Air Max 90".into(),
            base_price: dec!(5000),
            images: vec![],
            sizes,
            is_published: false,
            published_at: None,
        }
    }

    fn size(label: &str, stock: i32, price: Option<Decimal>) -> ProductSize {
        ProductSize {
            size: label.into(),
            stock,
            price,
        }
    }

    #[test]
    fn test_size_lines_use_effective_price() {
        let p = product(vec![
            size("US 9", 3, Some(dec!(5000))),
            size("US 10", 0, None),
        ]);
        assert_eq!(size_lines(&p, "₱"), "US 9 (3) - ₱5000\nUS 10 (0) - ₱5000");
    }

    #[test]
    fn test_price_formatting() {
        assert_eq!(format_price(dec!(5000)), "5000");
        assert_eq!(format_price(dec!(5000.00)), "5000");
        assert_eq!(format_price(dec!(4999.5)), "4999.50");
        assert_eq!(format_price(dec!(12.346)), "12.35");
    }

    #[test]
    fn test_new_product_caption() {
        let engine = CaptionEngine::new("₱").unwrap();
        let p = product(vec![size("US 9", 3, None), size("US 10", 0, Some(Decimal::ZERO))]);

        let caption = engine
            .render(PublishTrigger::ProductCreated, &p, "https://sidestep.studio/product/42/")
            .unwrap();

        assert!(caption.starts_with("🔥 NEW DROP!"));
        assert!(caption.contains("Nike Air Max 90"));
        assert!(caption.contains("US 9 (3) - ₱5000\nUS 10 (0) - ₱5000"));
        assert!(caption.contains("Check it out on: https://sidestep.studio/product/42/"));
        assert!(caption.ends_with("#sidestep #sneakers #kicks"));
    }

    #[test]
    fn test_new_photos_caption_has_its_own_prefix() {
        let engine = CaptionEngine::new("₱").unwrap();
        let caption = engine
            .render(PublishTrigger::ImageAdded, &product(vec![]), "https://x.test/product/42/")
            .unwrap();

        assert!(caption.starts_with("📸 Fresh photos"));
        assert!(!caption.contains("Available sizes"));
    }

    #[test]
    fn test_no_html_escaping() {
        let engine = CaptionEngine::new("$").unwrap();
        let mut p = product(vec![]);
        p.brand = "A&B".into();
        p.name = "\"Lows\"".into();

        let caption = engine.render(PublishTrigger::ProductCreated, &p, "l").unwrap();
        assert!(caption.contains("A&B \"Lows\""));
    }
}
