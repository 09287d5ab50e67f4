pub(crate) macro_rules! cfg {
    (
        #[$meta:meta]
        $($item:item)*
    ) => {
        $(
            #[cfg($meta)]
            #[cfg_attr(docsrs, doc(cfg($meta)))]
            $item
        )*
    }
}

pub(crate) macro_rules! cfg_not {
    (
        #[$meta:meta]
        $($item:item)*
    ) => {
        $(
            #[cfg(not($meta))]
            $item
        )*
    }
}

/// Like [`cfg!`], but also documents the gated item under `docsrs` without requiring the
/// feature to actually be enabled for the doc build.
pub(crate) macro_rules! cfg_doc {
    (
        #[$meta:meta]
        $($item:item)*
    ) => {
        $(
            #[cfg($meta)]
            #[cfg_attr(docsrs, doc(cfg($meta)))]
            $item
        )*
    }
}

pub(crate) macro_rules! cfg_loom {
    ($($item:item)*) => {
        $(
            #[cfg(loom)]
            $item
        )*
    }
}

pub(crate) macro_rules! cfg_not_loom {
    ($($item:item)*) => {
        $(
            #[cfg(not(loom))]
            $item
        )*
    }
}

pub(crate) macro_rules! cfg_frame {
    ($($item:item)*) => {
        $(
            #[cfg(feature = "frame")]
            #[cfg_attr(docsrs, doc(cfg(feature = "frame")))]
            $item
        )*
    }
}

pub(crate) macro_rules! cfg_not_frame {
    ($($item:item)*) => {
        $(
            #[cfg(not(feature = "frame"))]
            $item
        )*
    }
}
