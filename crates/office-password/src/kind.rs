use std::fmt;

/// OOXML package kinds that can be password protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OfficeDocumentKind {
    Docx,
    Xlsx,
    Pptx,
}

const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const PPTX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";

impl OfficeDocumentKind {
    /// Accepts `docx`, `.docx`, `DOCX` and so on.
    pub fn from_extension(extension: &str) -> Option<Self> {
        let extension = extension.trim().trim_start_matches('.');
        if extension.eq_ignore_ascii_case("docx") {
            Some(OfficeDocumentKind::Docx)
        } else if extension.eq_ignore_ascii_case("xlsx") {
            Some(OfficeDocumentKind::Xlsx)
        } else if extension.eq_ignore_ascii_case("pptx") {
            Some(OfficeDocumentKind::Pptx)
        } else {
            None
        }
    }

    /// Maps a response `Content-Type`, ignoring parameters such as `charset`.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type.split(';').next().unwrap_or_default().trim();
        if essence.eq_ignore_ascii_case(DOCX_CONTENT_TYPE) {
            Some(OfficeDocumentKind::Docx)
        } else if essence.eq_ignore_ascii_case(XLSX_CONTENT_TYPE) {
            Some(OfficeDocumentKind::Xlsx)
        } else if essence.eq_ignore_ascii_case(PPTX_CONTENT_TYPE) {
            Some(OfficeDocumentKind::Pptx)
        } else {
            None
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OfficeDocumentKind::Docx => "docx",
            OfficeDocumentKind::Xlsx => "xlsx",
            OfficeDocumentKind::Pptx => "pptx",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            OfficeDocumentKind::Docx => DOCX_CONTENT_TYPE,
            OfficeDocumentKind::Xlsx => XLSX_CONTENT_TYPE,
            OfficeDocumentKind::Pptx => PPTX_CONTENT_TYPE,
        }
    }
}

impl fmt::Display for OfficeDocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_are_case_insensitive_and_dot_tolerant() {
        assert_eq!(
            OfficeDocumentKind::from_extension(".XLSX"),
            Some(OfficeDocumentKind::Xlsx)
        );
        assert_eq!(
            OfficeDocumentKind::from_extension("docx"),
            Some(OfficeDocumentKind::Docx)
        );
        assert_eq!(OfficeDocumentKind::from_extension("pdf"), None);
        assert_eq!(OfficeDocumentKind::from_extension("xls"), None);
    }

    #[test]
    fn content_type_parameters_are_ignored() {
        assert_eq!(
            OfficeDocumentKind::from_content_type(
                "application/vnd.openxmlformats-officedocument.presentationml.presentation; charset=binary"
            ),
            Some(OfficeDocumentKind::Pptx)
        );
        assert_eq!(OfficeDocumentKind::from_content_type("text/html"), None);
    }

    #[test]
    fn every_kind_maps_back_from_its_own_metadata() {
        for kind in [
            OfficeDocumentKind::Docx,
            OfficeDocumentKind::Xlsx,
            OfficeDocumentKind::Pptx,
        ] {
            assert_eq!(OfficeDocumentKind::from_extension(kind.extension()), Some(kind));
            assert_eq!(
                OfficeDocumentKind::from_content_type(kind.content_type()),
                Some(kind)
            );
            assert_eq!(kind.to_string(), kind.extension());
        }
    }
}
