use crate::error::{Error, Result};
use crate::frame_type::FrameType;
use crate::record::{StackFrame, ThreadInfo};

/// Produces the label of a tree node for a raw frame of the given type.
///
/// Java frames are labelled `Class#method`, native, C++ and kernel frames by their method
/// alone, and thread roots by [`thread_label`]. A thread root without a thread, or any other
/// synthetic type, is rejected; those labels come from the record rather than a raw frame.
pub fn name(frame: &StackFrame, thread: Option<&ThreadInfo>, frame_type: FrameType) -> Result<String> {
    match frame_type {
        FrameType::JitCompiled
        | FrameType::C1Compiled
        | FrameType::Interpreted
        | FrameType::Inlined => {
            let mut label =
                String::with_capacity(frame.class_name.len() + frame.method_name.len() + 1);
            label.push_str(&frame.class_name);
            label.push('#');
            label.push_str(&frame.method_name);
            Ok(label)
        }
        FrameType::Native | FrameType::Cpp | FrameType::Kernel => Ok(frame.method_name.clone()),
        FrameType::ThreadNameSynthetic => match thread {
            Some(thread) => Ok(thread_label(thread)),
            None => Err(Error::UnnameableFrameType(frame_type)),
        },
        FrameType::Unknown => Err(Error::UnknownFrameType {
            class_name: frame.class_name.clone(),
            method_name: frame.method_name.clone(),
        }),
        other => Err(Error::UnnameableFrameType(other)),
    }
}

/// Label of the synthetic root node of a thread.
///
/// `name (javaThreadId)` for Java threads, `name (osThreadId)` otherwise, with ` (V)`
/// appended for virtual threads.
pub fn thread_label(thread: &ThreadInfo) -> String {
    let id = if thread.java_thread_id > 0 {
        thread.java_thread_id
    } else {
        thread.os_thread_id
    };

    let mut buffer = itoa::Buffer::new();
    let id = buffer.format(id);
    let mut label = String::with_capacity(thread.name.len() + id.len() + 8);
    label.push_str(&thread.name);
    label.push_str(" (");
    label.push_str(id);
    label.push(')');
    if thread.is_virtual {
        label.push_str(" (V)");
    }
    label
}
