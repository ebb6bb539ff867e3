//! File classification for CAD part catalogs
//!
//! Given a file name, determines its semantic kind (per-vendor CAD formats,
//! neutral CAD formats, office formats) and, for version-suffixed kinds
//! such as Pro/E's `part.prt.3`, the base name and version number.
//!
//! Patterns are tried in enumeration order and the first whole-name match
//! wins; anything unmatched classifies as [`FileKind::Undefined`].

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

/// Closed enumeration of recognized file kinds.
///
/// The declaration order is the match order: version-suffixed Pro/E kinds
/// come first so that `part.prt.3` is claimed by [`FileKind::PrtProe`]
/// before the plain `.prt` pattern of [`FileKind::PrtNx`] can see it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// Pro/ENGINEER part (versioned, `*.prt.N`)
    PrtProe,
    /// Pro/ENGINEER assembly (versioned)
    Asm,
    /// Pro/ENGINEER drawing (versioned)
    Drw,
    /// Pro/ENGINEER format (versioned)
    Frm,
    /// Pro/ENGINEER neutral (versioned)
    NeuProe,
    /// CATIA part
    CatPart,
    /// CATIA product
    CatProduct,
    /// CATIA drawing
    CatDrawing,
    /// Siemens NX part
    PrtNx,
    /// SolidWorks part
    SldPrt,
    /// SolidWorks assembly
    SldAsm,
    /// SolidWorks drawing
    SldDrw,
    /// Solid Edge part
    Par,
    /// Solid Edge sheet metal
    Psm,
    /// Solid Edge draft
    Dft,
    /// Inventor part
    Ipt,
    /// Inventor assembly
    Iam,
    /// Inventor drawing
    Idw,
    /// AutoCAD drawing
    Dwg,
    /// STEP neutral format
    Step,
    /// IGES neutral format
    Iges,
    /// DXF neutral format
    Dxf,
    /// Stereolithography mesh
    Stl,
    /// Blender scene
    Blend,
    /// PDF document
    Pdf,
    /// Office text document
    OfficeWriter,
    /// Office spreadsheet
    OfficeCalc,
    /// Office presentation
    OfficeImpress,
    /// Office drawing
    OfficeDraw,
    /// Office project plan
    OfficeProject,
    /// Office database
    OfficeBase,
    /// Anything unrecognized
    Undefined,
}

/// Result of classifying a file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Matched kind, or [`FileKind::Undefined`]
    pub kind: FileKind,
    /// Base name captured by a versioned pattern (`part.prt` for
    /// `part.prt.3`); `None` for unversioned matches
    pub base_name: Option<String>,
    /// Captured version number; 0 when the pattern has no version group
    pub version: u32,
}

impl Classification {
    fn undefined() -> Self {
        Self {
            kind: FileKind::Undefined,
            base_name: None,
            version: 0,
        }
    }
}

/// All kinds in match order, excluding `Undefined`
const MATCH_ORDER: &[FileKind] = &[
    FileKind::PrtProe,
    FileKind::Asm,
    FileKind::Drw,
    FileKind::Frm,
    FileKind::NeuProe,
    FileKind::CatPart,
    FileKind::CatProduct,
    FileKind::CatDrawing,
    FileKind::PrtNx,
    FileKind::SldPrt,
    FileKind::SldAsm,
    FileKind::SldDrw,
    FileKind::Par,
    FileKind::Psm,
    FileKind::Dft,
    FileKind::Ipt,
    FileKind::Iam,
    FileKind::Idw,
    FileKind::Dwg,
    FileKind::Step,
    FileKind::Iges,
    FileKind::Dxf,
    FileKind::Stl,
    FileKind::Blend,
    FileKind::Pdf,
    FileKind::OfficeWriter,
    FileKind::OfficeCalc,
    FileKind::OfficeImpress,
    FileKind::OfficeDraw,
    FileKind::OfficeProject,
    FileKind::OfficeBase,
];

static PATTERNS: Lazy<Vec<(FileKind, Regex)>> = Lazy::new(|| {
    MATCH_ORDER
        .iter()
        .map(|&kind| {
            let rx = RegexBuilder::new(&kind.pattern())
                .case_insensitive(true)
                .build()
                .expect("classifier pattern must compile");
            (kind, rx)
        })
        .collect()
});

impl FileKind {
    /// Whole-name match pattern for this kind.
    ///
    /// Versioned kinds carry two capture groups (base name, version
    /// digits); all other patterns have none.
    fn pattern(self) -> String {
        match self {
            FileKind::PrtProe => versioned_pattern("prt"),
            FileKind::Asm => versioned_pattern("asm"),
            FileKind::Drw => versioned_pattern("drw"),
            FileKind::Frm => versioned_pattern("frm"),
            FileKind::NeuProe => versioned_pattern("neu"),
            FileKind::CatPart => extension_pattern(&["catpart"]),
            FileKind::CatProduct => extension_pattern(&["catproduct"]),
            FileKind::CatDrawing => extension_pattern(&["catdrawing"]),
            FileKind::PrtNx => extension_pattern(&["prt"]),
            FileKind::SldPrt => extension_pattern(&["sldprt"]),
            FileKind::SldAsm => extension_pattern(&["sldasm"]),
            FileKind::SldDrw => extension_pattern(&["slddrw"]),
            FileKind::Par => extension_pattern(&["par"]),
            FileKind::Psm => extension_pattern(&["psm"]),
            FileKind::Dft => extension_pattern(&["dft"]),
            FileKind::Ipt => extension_pattern(&["ipt"]),
            FileKind::Iam => extension_pattern(&["iam"]),
            FileKind::Idw => extension_pattern(&["idw"]),
            FileKind::Dwg => extension_pattern(&["dwg"]),
            FileKind::Step => extension_pattern(&["step", "stp"]),
            FileKind::Iges => extension_pattern(&["iges", "igs"]),
            FileKind::Dxf => extension_pattern(&["dxf"]),
            FileKind::Stl => extension_pattern(&["stl"]),
            FileKind::Blend => extension_pattern(&["blend"]),
            FileKind::Pdf => extension_pattern(&["pdf"]),
            FileKind::OfficeWriter => extension_pattern(&[
                "odt", "ott", "odm", "doc", "dot", "docx", "docm", "dotx", "dotm",
            ]),
            FileKind::OfficeCalc => extension_pattern(&[
                "ods", "ots", "xls", "xlt", "xlm", "xlsx", "xlsm", "xltx", "xltm", "csv",
            ]),
            FileKind::OfficeImpress => extension_pattern(&[
                "odp", "otp", "ppt", "pot", "pps", "pptx", "pptm", "potx", "potm", "ppam",
                "ppsx", "ppsm", "sldx", "sldm",
            ]),
            FileKind::OfficeDraw => extension_pattern(&["odg", "otg"]),
            FileKind::OfficeProject => extension_pattern(&["mpd", "mpp"]),
            FileKind::OfficeBase => {
                extension_pattern(&["odb", "mdb", "accdb", "accde", "accdt", "accdr"])
            }
            FileKind::Undefined => String::new(),
        }
    }

    /// Kinds carrying a numeric version suffix
    pub fn versioned_kinds() -> &'static [FileKind] {
        &[
            FileKind::PrtProe,
            FileKind::Asm,
            FileKind::Drw,
            FileKind::Frm,
            FileKind::NeuProe,
        ]
    }

    /// Resource key for the kind's icon. A missing resource on the
    /// presentation side yields a null icon, not an error.
    pub fn icon_key(self) -> &'static str {
        match self {
            FileKind::PrtProe => "prt_proe",
            FileKind::Asm => "asm",
            FileKind::Drw => "drw",
            FileKind::Frm => "frm",
            FileKind::NeuProe => "neu_proe",
            FileKind::CatPart => "catpart",
            FileKind::CatProduct => "catproduct",
            FileKind::CatDrawing => "catdrawing",
            FileKind::PrtNx => "prt_nx",
            FileKind::SldPrt => "sldprt",
            FileKind::SldAsm => "sldasm",
            FileKind::SldDrw => "slddrw",
            FileKind::Par => "par",
            FileKind::Psm => "psm",
            FileKind::Dft => "dft",
            FileKind::Ipt => "ipt",
            FileKind::Iam => "iam",
            FileKind::Idw => "idw",
            FileKind::Dwg => "dwg",
            FileKind::Step => "step",
            FileKind::Iges => "iges",
            FileKind::Dxf => "dxf",
            FileKind::Stl => "stl",
            FileKind::Blend => "blend",
            FileKind::Pdf => "pdf",
            FileKind::OfficeWriter => "office-document",
            FileKind::OfficeCalc => "office-spreadsheet",
            FileKind::OfficeImpress => "office-presentation",
            FileKind::OfficeDraw => "office-drawing",
            FileKind::OfficeProject => "office-project",
            FileKind::OfficeBase => "office-database",
            FileKind::Undefined => "undefined",
        }
    }

    /// Human-readable label for the kind's match pattern
    pub fn pattern_label(self) -> &'static str {
        match self {
            FileKind::PrtProe | FileKind::PrtNx => "*.prt",
            FileKind::Asm => "*.asm",
            FileKind::Drw => "*.drw",
            FileKind::Frm => "*.frm",
            FileKind::NeuProe => "*.neu",
            FileKind::CatPart => "*.catpart",
            FileKind::CatProduct => "*.catproduct",
            FileKind::CatDrawing => "*.catdrawing",
            FileKind::SldPrt => "*.sldprt",
            FileKind::SldAsm => "*.sldasm",
            FileKind::SldDrw => "*.slddrw",
            FileKind::Par => "*.par",
            FileKind::Psm => "*.psm",
            FileKind::Dft => "*.dft",
            FileKind::Ipt => "*.ipt",
            FileKind::Iam => "*.iam",
            FileKind::Idw => "*.idw",
            FileKind::Dwg => "*.dwg",
            FileKind::Step => "*.step",
            FileKind::Iges => "*.iges",
            FileKind::Dxf => "*.dxf",
            FileKind::Stl => "*.stl",
            FileKind::Blend => "*.blend",
            FileKind::Pdf => "*.pdf",
            FileKind::OfficeWriter => "Office document",
            FileKind::OfficeCalc => "Office spreadsheet",
            FileKind::OfficeImpress => "Office presentation",
            FileKind::OfficeDraw => "Office drawing",
            FileKind::OfficeProject => "Office project",
            FileKind::OfficeBase => "Office database",
            FileKind::Undefined => "undefined",
        }
    }

    /// Whole-name regex for this kind, case-insensitive. Used by the
    /// metadata version scanner as well as the classifier itself.
    pub fn regex(self) -> Option<&'static Regex> {
        PATTERNS.iter().find(|(k, _)| *k == self).map(|(_, rx)| rx)
    }
}

fn versioned_pattern(ext: &str) -> String {
    format!(r"^(.+\.{ext})\.(\d+)$")
}

fn extension_pattern(exts: &[&str]) -> String {
    format!(r"^.+\.(?:{})$", exts.join("|"))
}

/// Classify a file name.
///
/// Patterns are tried in enumeration order; the first whole-name match
/// wins. Unmatched names yield [`FileKind::Undefined`].
pub fn classify(name: &str) -> Classification {
    for (kind, rx) in PATTERNS.iter() {
        if let Some(caps) = rx.captures(name) {
            // Versioned patterns capture (base, digits); plain extension
            // tests capture nothing.
            let (base_name, version) = match (caps.get(1), caps.get(2)) {
                (Some(base), Some(digits)) => (
                    Some(base.as_str().to_string()),
                    digits.as_str().parse().unwrap_or(0),
                ),
                _ => (None, 0),
            };
            return Classification {
                kind: *kind,
                base_name,
                version,
            };
        }
    }
    Classification::undefined()
}
