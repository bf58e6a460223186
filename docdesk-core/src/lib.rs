mod client;

pub use client::{
    ApiErrorClass, DeskClient, DeskError, DocumentId, DocumentPage, DocumentQuery, DocumentRecord,
    FolderDeletion, FolderId, FolderRecord, FolderRef, UploadReceipt, UploadRequest,
};
