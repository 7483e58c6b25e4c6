use std::fmt;

use rgb::RGB8;
use serde::{Deserialize, Serialize};

/// Classification of a frame in a frame tree.
///
/// Regular types come straight from the recording and describe how the JVM was executing the
/// method when the sample was taken. Synthetic types mark nodes the aggregator inserts itself
/// to carry derived context (thread identity, the allocated or blocked-on class, normalized
/// lambda machinery).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrameType {
    /// Fully optimized (C2) compiled code.
    JitCompiled,
    /// First-tier compiled code.
    C1Compiled,
    /// Bytecode interpreter.
    Interpreted,
    /// Method inlined into its caller.
    Inlined,
    /// Native library code.
    Native,
    /// JVM-internal C++ code.
    Cpp,
    /// Operating system kernel.
    Kernel,
    /// Root node naming the sampled thread.
    ThreadNameSynthetic,
    /// Allocated class for a generic allocation sample.
    AllocatedObjectSynthetic,
    /// Allocated class for an allocation in a new thread-local allocation region.
    AllocatedObjectInNewRegionSynthetic,
    /// Allocated class for an allocation outside of a thread-local allocation region.
    AllocatedObjectOutsideRegionSynthetic,
    /// Class of the monitor or parked-on object a thread was blocked on.
    BlockingObjectSynthetic,
    /// Normalized lambda/method-handle infrastructure.
    LambdaSynthetic,
    /// A frame kind the recording did not classify.
    Unknown,
    /// A node explicitly highlighted for attention.
    HighlightedWarning,
}

use self::FrameType::*;

impl FrameType {
    /// Every frame type, in declaration order.
    pub const ALL: [FrameType; 15] = [
        JitCompiled,
        C1Compiled,
        Interpreted,
        Inlined,
        Native,
        Cpp,
        Kernel,
        ThreadNameSynthetic,
        AllocatedObjectSynthetic,
        AllocatedObjectInNewRegionSynthetic,
        AllocatedObjectOutsideRegionSynthetic,
        BlockingObjectSynthetic,
        LambdaSynthetic,
        Unknown,
        HighlightedWarning,
    ];

    /// Maps the frame-type code a recording attaches to each raw frame (`"JIT compiled"`,
    /// `"Inlined"`, `"C++"`, ...) onto a frame type.
    ///
    /// Titles of synthetic types are accepted as their own codes. Anything else is
    /// [`FrameType::Unknown`].
    pub fn from_code(code: &str) -> FrameType {
        match code {
            "JIT compiled" => JitCompiled,
            "C1 compiled" => C1Compiled,
            "Interpreted" => Interpreted,
            "Inlined" => Inlined,
            "Native" => Native,
            "C++" => Cpp,
            "Kernel" => Kernel,
            code => Self::ALL
                .iter()
                .copied()
                .filter(|t| t.is_synthetic())
                .find(|t| t.title() == code)
                .unwrap_or(Unknown),
        }
    }

    /// Whether the frame executes Java bytecode (in any compile tier).
    pub fn is_java_frame(self) -> bool {
        matches!(self, JitCompiled | C1Compiled | Interpreted | Inlined)
    }

    /// Whether the aggregator inserts frames of this type itself.
    pub fn is_synthetic(self) -> bool {
        !matches!(
            self,
            JitCompiled | C1Compiled | Interpreted | Inlined | Native | Cpp | Kernel
        )
    }

    /// Whether this is one of the three allocated-object types.
    pub fn is_allocation(self) -> bool {
        matches!(
            self,
            AllocatedObjectSynthetic
                | AllocatedObjectInNewRegionSynthetic
                | AllocatedObjectOutsideRegionSynthetic
        )
    }

    /// Human-readable title, shown in a renderer's legend.
    pub fn title(self) -> &'static str {
        match self {
            JitCompiled => "JIT-compiled",
            C1Compiled => "C1-compiled",
            Interpreted => "Interpreted",
            Inlined => "Inlined",
            Native => "Native",
            Cpp => "C++",
            Kernel => "Kernel",
            ThreadNameSynthetic => "Thread Name (Synthetic)",
            AllocatedObjectSynthetic => "Allocated Object (Synthetic)",
            AllocatedObjectInNewRegionSynthetic => "Allocated Object in new TLAB (Synthetic)",
            AllocatedObjectOutsideRegionSynthetic => "Allocated Object outside TLAB (Synthetic)",
            BlockingObjectSynthetic => "Blocking Object (Synthetic)",
            LambdaSynthetic => "Lambda Frame (Synthetic)",
            Unknown => "Unknown",
            HighlightedWarning => "Highlighted Warning",
        }
    }

    /// Fill color used when rendering frames of this type.
    pub fn color(self) -> RGB8 {
        match self {
            JitCompiled => RGB8::new(0x9a, 0xe6, 0x94),
            C1Compiled => RGB8::new(0xcc, 0xe8, 0x80),
            Interpreted => RGB8::new(0xff, 0xc6, 0x6d),
            Inlined => RGB8::new(0x6b, 0xdf, 0xe0),
            Native => RGB8::new(0xff, 0x8a, 0x80),
            Cpp => RGB8::new(0xe0, 0xe0, 0x44),
            Kernel => RGB8::new(0xe0, 0x9c, 0x3e),
            ThreadNameSynthetic => RGB8::new(0xe8, 0xe8, 0xe8),
            AllocatedObjectSynthetic => RGB8::new(0x00, 0xb6, 0xff),
            AllocatedObjectInNewRegionSynthetic => RGB8::new(0x00, 0x9a, 0xdb),
            AllocatedObjectOutsideRegionSynthetic => RGB8::new(0x5c, 0xd4, 0xff),
            BlockingObjectSynthetic => RGB8::new(0xd9, 0xc8, 0xff),
            LambdaSynthetic => RGB8::new(0xb3, 0xb3, 0xb3),
            Unknown => RGB8::new(0x00, 0x00, 0x00),
            HighlightedWarning => RGB8::new(0xee, 0x00, 0xee),
        }
    }

    /// [`FrameType::color`] as a `#rrggbb` string.
    pub fn color_hex(self) -> String {
        let RGB8 { r, g, b } = self.color();
        format!("#{:02x}{:02x}{:02x}", r, g, b)
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.title())
    }
}
