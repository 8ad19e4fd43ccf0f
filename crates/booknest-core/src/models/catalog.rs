use serde::{Deserialize, Serialize};

use super::{check_len, check_required};
use crate::slug::slugify;
use crate::time::{iso_millis, iso_millis_opt, new_id, now, Timestamp};
use crate::{BookNestError, Result};

pub const DEFAULT_AUTHOR_DES: &str = "Chưa có thông tin gì về tác giả này";
pub const DEFAULT_AUTHOR_IMAGE: &str = "/images/tt3.jpg";
pub const DEFAULT_CATEGORY_SLUG: &str = "khac";

fn default_author_des() -> String {
    DEFAULT_AUTHOR_DES.to_string()
}

fn default_author_image() -> String {
    DEFAULT_AUTHOR_IMAGE.to_string()
}

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Author {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default, with = "iso_millis_opt", skip_serializing_if = "Option::is_none")]
    pub birth: Option<Timestamp>,
    #[serde(default = "default_author_des")]
    pub des: String,
    #[serde(default = "default_author_image")]
    pub image: String,
    #[serde(default)]
    pub slug: String,
}

impl Author {
    /// The slug is derived from the name; callers make it unique.
    pub fn new(name: &str) -> Result<Self> {
        let name = name.trim();
        check_required("name", name)?;
        check_len("name", name, 255)?;
        Ok(Self {
            id: new_id(),
            name: name.to_string(),
            birth: None,
            des: default_author_des(),
            image: default_author_image(),
            slug: slugify(name),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthorBrief {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub slug: String,
}

impl From<&Author> for AuthorBrief {
    fn from(author: &Author) -> Self {
        Self {
            id: author.id.clone(),
            name: author.name.clone(),
            slug: author.slug.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AuthorView {
    #[serde(flatten)]
    pub author: Author,
    #[serde(rename = "novelCount")]
    pub novel_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    #[serde(rename = "_id")]
    pub id: String,
    pub cate: String,
    #[serde(default)]
    pub e_cate: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default = "yes")]
    pub editable: bool,
}

impl Category {
    pub fn new(cate: &str, e_cate: Option<&str>) -> Result<Self> {
        let cate = cate.trim();
        check_required("cate", cate)?;
        check_len("cate", cate, 255)?;
        let e_cate = e_cate.unwrap_or_default().trim();
        check_len("e_cate", e_cate, 255)?;
        Ok(Self {
            id: new_id(),
            cate: cate.to_string(),
            e_cate: e_cate.to_string(),
            slug: slugify(cate),
            editable: true,
        })
    }

    /// The fallback category novels are moved into when theirs is deleted.
    pub fn fallback() -> Self {
        Self {
            id: new_id(),
            cate: "Khác".to_string(),
            e_cate: "Other".to_string(),
            slug: DEFAULT_CATEGORY_SLUG.to_string(),
            editable: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryBrief {
    #[serde(rename = "_id")]
    pub id: String,
    pub cate: String,
    pub slug: String,
}

impl From<&Category> for CategoryBrief {
    fn from(category: &Category) -> Self {
        Self {
            id: category.id.clone(),
            cate: category.cate.clone(),
            slug: category.slug.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CategoryView {
    #[serde(flatten)]
    pub category: Category,
    #[serde(rename = "novelCount")]
    pub novel_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tag {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "createdAt", with = "iso_millis")]
    pub created_at: Timestamp,
    #[serde(rename = "updatedAt", with = "iso_millis")]
    pub updated_at: Timestamp,
}

impl Tag {
    pub fn new(name: &str, description: Option<String>) -> Result<Self> {
        let name = name.trim();
        validate_tag_name(name)?;
        if let Some(desc) = &description {
            check_len("description", desc, 255)?;
        }
        let slug = slugify(name);
        let ts = now();
        Ok(Self {
            id: new_id(),
            name: name.to_string(),
            slug,
            description,
            created_at: ts,
            updated_at: ts,
        })
    }
}

pub fn validate_tag_name(name: &str) -> Result<()> {
    check_required("tag name", name)?;
    check_len("tag name", name, 50)?;
    let slug = slugify(name);
    if slug.is_empty() {
        return Err(BookNestError::validation(format!(
            "tag name '{}' has no usable characters",
            name
        )));
    }
    check_len("tag slug", &slug, 100)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TagBrief {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub slug: String,
}

impl From<&Tag> for TagBrief {
    fn from(tag: &Tag) -> Self {
        Self {
            id: tag.id.clone(),
            name: tag.name.clone(),
            slug: tag.slug.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn author_defaults() {
        let author = Author::new(" Thiên Tằm Thổ Đậu ").unwrap();
        assert_eq!(author.slug, "thien-tam-tho-dau");
        assert_eq!(author.des, DEFAULT_AUTHOR_DES);
        assert!(Author::new("   ").is_err());
    }

    #[test]
    fn tag_names_are_bounded() {
        assert!(Tag::new("Xuyên Không", None).is_ok());
        assert!(Tag::new(&"x".repeat(51), None).is_err());
        assert!(Tag::new("!!!", None).is_err());
    }

    #[test]
    fn fallback_category_is_locked() {
        let cate = Category::fallback();
        assert_eq!(cate.slug, DEFAULT_CATEGORY_SLUG);
        assert!(!cate.editable);
    }
}
